//! Error types for site-gate

use std::io;

use thiserror::Error;

/// Result type alias for site-gate
pub type Result<T> = std::result::Result<T, Error>;

/// site-gate errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream (origin or content source) answered with something unusable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Client request we refuse to forward
    #[error("Invalid request: {0}")]
    Request(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error came from talking to another service rather than from us
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        assert!(Error::Upstream("502".to_string()).is_upstream());
        assert!(!Error::Config("bad".to_string()).is_upstream());
        assert!(!Error::Internal("oops".to_string()).is_upstream());
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            Error::Config("missing origin".to_string()).to_string(),
            "Configuration error: missing origin"
        );
    }
}
