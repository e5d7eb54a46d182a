use thiserror::Error;

/// Failure taxonomy shared by every layer of the retrieval stack.
///
/// Payloads are plain strings so one failure can be handed to every caller
/// that joined a coalesced computation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Not configured: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Upstream failure{}: {}", status_suffix(.status), .message)]
    Upstream { status: Option<u16>, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store failure: {0}")]
    Store(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Cache failure: {0}")]
    Cache(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream { status, message: message.into() }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    /// Transport failures and throttling/server-side statuses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status: None, .. } | Self::Timeout(_) => true,
            Self::Upstream { status: Some(code), .. } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::upstream(None, "connection reset").is_retryable());
        assert!(Error::upstream(Some(429), "slow down").is_retryable());
        assert!(Error::upstream(Some(503), "unavailable").is_retryable());
        assert!(!Error::upstream(Some(400), "bad request").is_retryable());
        assert!(!Error::Protocol("count mismatch".into()).is_retryable());
    }

    #[test]
    fn upstream_display_includes_status() {
        let e = Error::upstream(Some(502), "bad gateway");
        assert_eq!(e.to_string(), "Upstream failure (status 502): bad gateway");
        let e = Error::upstream(None, "refused");
        assert_eq!(e.to_string(), "Upstream failure: refused");
    }
}
