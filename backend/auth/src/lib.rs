//! Authentication for the links manager client.
//!
//! - `token`: pure parsing of the self-describing session token
//! - `store`: durable token and credentials files
//! - `authenticator`: cached token, forced re-login and the retry-once wrapper

pub mod authenticator;
pub mod store;
pub mod token;

pub use authenticator::Authenticator;
pub use store::CredentialStore;
pub use token::{parse_token, SessionToken, TokenError};
