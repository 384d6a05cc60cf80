//! Error taxonomy for Smart Buddy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuddyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Sink failure: {0}")]
    SinkFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuddyError {
    /// Stable machine-readable name, used as the metrics error key and the
    /// HTTP error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnknownMode(_) => "unknown_mode",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::StorageFailure(_) => "storage_failure",
            Self::SinkFailure(_) => "sink_failure",
            Self::NotFound(_) => "not_found",
            Self::Tool(_) => "tool_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Client-side mistakes that callers should fix rather than retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnknownMode(_) | Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BuddyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(BuddyError::InvalidRequest("x".into()).kind(), "invalid_request");
        assert_eq!(
            BuddyError::UpstreamUnavailable("timeout".into()).kind(),
            "upstream_unavailable"
        );
        assert_eq!(BuddyError::StorageFailure("db".into()).kind(), "storage_failure");
    }

    #[test]
    fn client_errors() {
        assert!(BuddyError::InvalidRequest("empty".into()).is_client_error());
        assert!(BuddyError::UnknownMode("x".into()).is_client_error());
        assert!(!BuddyError::UpstreamUnavailable("x".into()).is_client_error());
        assert!(!BuddyError::SinkFailure("x".into()).is_client_error());
    }

    #[test]
    fn display_includes_detail() {
        let err = BuddyError::UnknownMode("doesnotexist".into());
        assert_eq!(err.to_string(), "Unknown mode: doesnotexist");
    }
}
