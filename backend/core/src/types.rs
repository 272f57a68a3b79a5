use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LmcError;

/// Operator credentials used to obtain session tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Body of a remote user creation request.
pub type NewUser = Credentials;

/// A link to be stored remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)?;
        if !self.description.is_empty() {
            write!(f, " \"{}\"", self.description)?;
        }
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        Ok(())
    }
}

/// The kinds of work the client knows how to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    Link(Link),
}

/// One unit of work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
}

impl Job {
    pub fn link(id: impl Into<String>, link: Link) -> Self {
        Self {
            id: id.into(),
            kind: JobKind::Link(link),
        }
    }

    /// Serialize to the opaque payload stored in the job log.
    pub fn to_payload(&self) -> Result<Vec<u8>, LmcError> {
        serde_json::to_vec(self).map_err(|e| LmcError::Encoding(e.to_string()))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, LmcError> {
        serde_json::from_slice(payload).map_err(|e| LmcError::Encoding(e.to_string()))
    }
}

/// Whether the remote is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Healthy,
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Healthy => f.write_str("healthy"),
            ConnectionState::Degraded => f.write_str("degraded"),
        }
    }
}
