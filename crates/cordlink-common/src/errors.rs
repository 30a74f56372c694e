#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures observable by a relay caller.
///
/// Only the message of an upstream failure crosses the wire, so
/// `Upstream` displays exactly the text the proxy reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("Request timeout")]
    Timeout { id: String, after_ms: u64 },

    #[error("{0}")]
    Upstream(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("Unknown command: {0}")]
    UnknownMethod(String),
}

impl RelayError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Protocol(e.to_string())
    }
}
