use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use lmc_core::{Credentials, LmcError, Link, NewUser, Probe, RemoteApi};

/// Header carrying the session token in both directions.
pub const AUTH_TOKEN_HEADER: &str = "X-AUTH-TOKEN";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed client for the links service.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    host: String,
}

impl HttpApi {
    /// `host` is the API base URL; a trailing `/` is added when missing.
    pub fn new(host: impl Into<String>) -> Result<Self, LmcError> {
        Self::with_timeout(host, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(host: impl Into<String>, timeout: Duration) -> Result<Self, LmcError> {
        let mut host = host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LmcError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn put_json<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<(), LmcError> {
        let response = self
            .client
            .put(self.url(path))
            .header(AUTH_TOKEN_HEADER, token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> LmcError {
    LmcError::Transport(e.without_url().to_string())
}

/// Map a response status onto the error taxonomy. The success body is discarded.
async fn check_status(response: Response) -> Result<(), LmcError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(LmcError::Unauthorized);
    }
    if status.is_server_error() {
        return Err(LmcError::Server {
            status: status.as_u16(),
        });
    }
    let message = response.text().await.unwrap_or_default();
    Err(LmcError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<String, LmcError> {
        debug!(username = %credentials.username, "Sending login request");
        let response = self
            .client
            .post(self.url("user/login"))
            .json(credentials)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LmcError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(LmcError::Authentication(format!(
                "user {} failed to authenticate with status {}",
                credentials.username,
                status.as_u16()
            )));
        }

        let token = response
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if token.is_empty() {
            warn!(username = %credentials.username, "Login succeeded without a token header");
            return Err(LmcError::Authentication(format!(
                "token is empty for user {}",
                credentials.username
            )));
        }
        Ok(token.to_string())
    }

    async fn create_user(&self, token: &str, user: &NewUser) -> Result<(), LmcError> {
        debug!(username = %user.username, "Creating remote user");
        self.put_json("user", token, user).await
    }

    async fn create_link(&self, token: &str, link: &Link) -> Result<(), LmcError> {
        debug!(url = %link.url, "Creating remote link");
        self.put_json("item/link", token, link).await
    }
}

#[async_trait]
impl Probe for HttpApi {
    async fn ping(&self) -> bool {
        match self.client.get(self.url("ping")).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e.without_url(), "Ping failed");
                false
            }
        }
    }
}
