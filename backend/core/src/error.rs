use thiserror::Error;

/// Top-level error type for the links manager client.
#[derive(Debug, Error)]
pub enum LmcError {
    /// The remote could not be reached at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session token was rejected (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Login did not yield a usable token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote answered with a 5xx status.
    #[error("server error: status {status}")]
    Server { status: u16 },

    /// The remote permanently refused the request.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How a delivery failure affects the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Token rejected; recoverable by re-authenticating once.
    Authorization,
    /// Remote unreachable or failing at the server level.
    Connectivity,
    /// The job itself is bad; never retried automatically.
    Terminal,
}

impl LmcError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            LmcError::Unauthorized | LmcError::Authentication(_) => FailureKind::Authorization,
            LmcError::Transport(_) | LmcError::Server { .. } => FailureKind::Connectivity,
            _ => FailureKind::Terminal,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        self.failure_kind() == FailureKind::Connectivity
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Authorization => "authorization",
            FailureKind::Connectivity => "connectivity",
            FailureKind::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(LmcError::Unauthorized.failure_kind(), FailureKind::Authorization);
        assert_eq!(
            LmcError::Authentication("empty token".into()).failure_kind(),
            FailureKind::Authorization
        );
        assert_eq!(
            LmcError::Transport("connection refused".into()).failure_kind(),
            FailureKind::Connectivity
        );
        assert_eq!(LmcError::Server { status: 503 }.failure_kind(), FailureKind::Connectivity);
        assert_eq!(
            LmcError::Rejected { status: 400, message: "bad url".into() }.failure_kind(),
            FailureKind::Terminal
        );
        assert_eq!(LmcError::Storage("disk full".into()).failure_kind(), FailureKind::Terminal);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Connectivity.to_string(), "connectivity");
    }
}
