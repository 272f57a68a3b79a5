use async_trait::async_trait;

use crate::error::LmcError;
use crate::types::{Credentials, Link, NewUser};

/// The remote links service, as consumed by the authenticator and delivery workers.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Exchange credentials for a raw session token.
    async fn login(&self, credentials: &Credentials) -> Result<String, LmcError>;

    async fn create_user(&self, token: &str, user: &NewUser) -> Result<(), LmcError>;

    /// Create a link. Any 2xx is success; the response body is ignored.
    async fn create_link(&self, token: &str, link: &Link) -> Result<(), LmcError>;
}

/// Lightweight reachability check. Never fails: errors mean "unreachable".
#[async_trait]
pub trait Probe: Send + Sync {
    async fn ping(&self) -> bool;
}
