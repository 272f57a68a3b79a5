use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lmc_core::{Credentials, LmcError, RemoteApi};

use crate::store::CredentialStore;
use crate::token::{parse_token, SessionToken};

#[derive(Default)]
struct Session {
    token: Option<SessionToken>,
    /// Whether the token file has been consulted since startup.
    loaded: bool,
}

/// Keeps a valid session token and re-authenticates on demand.
///
/// Shared between delivery workers; the session lock also serializes logins so
/// concurrent callers with an expired token trigger a single refresh.
pub struct Authenticator {
    api: Arc<dyn RemoteApi>,
    store: CredentialStore,
    credentials: RwLock<Credentials>,
    session: Mutex<Session>,
}

impl Authenticator {
    pub fn new(api: Arc<dyn RemoteApi>, store: CredentialStore, credentials: Credentials) -> Self {
        Self {
            api,
            store,
            credentials: RwLock::new(credentials),
            session: Mutex::new(Session::default()),
        }
    }

    /// Replace the credentials (operator re-entered them) and drop the current session.
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write().await = credentials;
        let mut session = self.session.lock().await;
        session.token = None;
        session.loaded = true;
    }

    pub async fn username(&self) -> String {
        self.credentials.read().await.username.clone()
    }

    /// Return a cached unexpired token, or log in and persist a fresh one.
    ///
    /// An expired token is never returned when `force_refresh` is false.
    pub async fn obtain_token(&self, force_refresh: bool) -> Result<SessionToken, LmcError> {
        let mut session = self.session.lock().await;

        if !force_refresh {
            if !session.loaded {
                session.token = self.load_saved_token().await;
                session.loaded = true;
            }
            if let Some(token) = session.token.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.clone());
            }
        }

        let token = self.login().await?;
        session.token = Some(token.clone());
        session.loaded = true;
        Ok(token)
    }

    /// Unconditional fresh login, persisted to the token file.
    pub async fn authenticate(&self) -> Result<SessionToken, LmcError> {
        self.obtain_token(true).await
    }

    /// Run `op` with a valid token. On an authorization failure, log in again
    /// exactly once and retry `op` a single time; a second rejection is returned.
    pub async fn with_auth<T, F, Fut>(&self, mut op: F) -> Result<T, LmcError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, LmcError>>,
    {
        let token = self.obtain_token(false).await?;
        match op(token.raw).await {
            Err(LmcError::Unauthorized) => {
                warn!("Token rejected by remote, re-authenticating once");
                let token = self.authenticate().await?;
                op(token.raw).await
            }
            other => other,
        }
    }

    async fn login(&self) -> Result<SessionToken, LmcError> {
        let credentials = self.credentials.read().await.clone();
        let raw = self.api.login(&credentials).await?;
        let token = parse_token(&raw)?;
        self.store.write_token(&token.raw).await?;
        info!(
            username = %credentials.username,
            subject = %token.subject,
            expires_at = token.expires_at,
            "Authenticated"
        );
        Ok(token)
    }

    async fn load_saved_token(&self) -> Option<SessionToken> {
        let raw = match self.store.read_token().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Could not read saved token");
                return None;
            }
        };
        match parse_token(&raw) {
            Ok(token) => {
                debug!(subject = %token.subject, expires_at = token.expires_at, "Loaded saved token");
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Saved token is malformed, ignoring it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use lmc_core::{Link, NewUser};

    fn make_token(subject: &str, exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{subject}","exp":{exp}}}"#));
        format!("{payload}.signature")
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[derive(Default)]
    struct FakeApi {
        logins: AtomicUsize,
        fail_login: bool,
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        async fn login(&self, credentials: &Credentials) -> Result<String, LmcError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_login {
                return Err(LmcError::Authentication("bad credentials".into()));
            }
            Ok(make_token(&format!("{}-{n}", credentials.username), future_exp()))
        }

        async fn create_user(&self, _token: &str, _user: &NewUser) -> Result<(), LmcError> {
            Ok(())
        }

        async fn create_link(&self, _token: &str, _link: &Link) -> Result<(), LmcError> {
            Ok(())
        }
    }

    fn setup(dir: &Path, api: FakeApi) -> (Arc<FakeApi>, Authenticator) {
        let api = Arc::new(api);
        let store = CredentialStore::new(dir.join("auth.token"), dir.join("credentials"));
        let auth = Authenticator::new(api.clone(), store, Credentials::new("alice", "secret"));
        (api, auth)
    }

    fn saved_token(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("auth.token")).unwrap()
    }

    #[tokio::test]
    async fn test_first_call_logs_in_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        let token = auth.obtain_token(false).await.unwrap();
        assert_eq!(token.subject, "alice-1");
        assert_eq!(saved_token(dir.path()), token.raw);

        let again = auth.obtain_token(false).await.unwrap();
        assert_eq!(again, token);
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_valid_saved_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let saved = make_token("saved", future_exp());
        std::fs::write(dir.path().join("auth.token"), format!("{saved}\n")).unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        let token = auth.obtain_token(false).await.unwrap();
        assert_eq!(token.raw, saved);
        assert_eq!(api.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_never_returned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth.token"), make_token("old", 10)).unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        let token = auth.obtain_token(false).await.unwrap();
        assert_eq!(token.subject, "alice-1");
        assert!(!token.is_expired());
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_saved_token_triggers_login() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth.token"), "not-a-token").unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        auth.obtain_token(false).await.unwrap();
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_always_logs_in() {
        let dir = tempfile::tempdir().unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        auth.obtain_token(false).await.unwrap();
        let refreshed = auth.authenticate().await.unwrap();
        assert_eq!(refreshed.subject, "alice-2");
        assert_eq!(saved_token(dir.path()), refreshed.raw);
        assert_eq!(api.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_auth_retries_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth.token"), make_token("saved", future_exp())).unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());
        let calls = AtomicUsize::new(0);

        let result: Result<(), LmcError> = auth
            .with_auth(|_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LmcError::Unauthorized) }
            })
            .await;

        assert!(matches!(result, Err(LmcError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_auth_retry_uses_new_token() {
        let dir = tempfile::tempdir().unwrap();
        let stale = make_token("saved", future_exp());
        std::fs::write(dir.path().join("auth.token"), &stale).unwrap();
        let (_api, auth) = setup(dir.path(), FakeApi::default());

        let result = auth
            .with_auth(|token| {
                let stale = stale.clone();
                async move {
                    if token == stale {
                        Err(LmcError::Unauthorized)
                    } else {
                        Ok(token)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(parse_token(&result).unwrap().subject, "alice-1");
    }

    #[tokio::test]
    async fn test_with_auth_does_not_retry_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());
        let calls = AtomicUsize::new(0);

        let result: Result<(), LmcError> = auth
            .with_auth(|_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LmcError::Server { status: 503 }) }
            })
            .await;

        assert!(matches!(result, Err(LmcError::Server { status: 503 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_failure_skips_operation() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            fail_login: true,
            ..Default::default()
        };
        let (_api, auth) = setup(dir.path(), api);
        let calls = AtomicUsize::new(0);

        let result: Result<(), LmcError> = auth
            .with_auth(|_token| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(LmcError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_credentials_drops_session() {
        let dir = tempfile::tempdir().unwrap();
        let (api, auth) = setup(dir.path(), FakeApi::default());

        auth.obtain_token(false).await.unwrap();
        auth.set_credentials(Credentials::new("bob", "pw")).await;
        let token = auth.obtain_token(false).await.unwrap();
        assert_eq!(token.subject, "bob-2");
        assert_eq!(auth.username().await, "bob");
        assert_eq!(api.logins.load(Ordering::SeqCst), 2);
    }
}
