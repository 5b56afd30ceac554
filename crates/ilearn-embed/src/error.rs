//! Error types for the embedding crate.

use thiserror::Error;

/// Result type alias using the embedding error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while loading or calling an embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider cannot be used in this process (feature disabled,
    /// model files missing, credentials absent).
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Invalid provider configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote provider answered with an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// HTTP transport failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Anything else that went wrong inside the provider.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmbedError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Network(e) => e.is_timeout() || e.is_connect(),
            EmbedError::Backend(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_transient() {
        let err = EmbedError::Unavailable("no model".to_string());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Embedding provider unavailable: no model");
    }

    #[test]
    fn test_backend_is_transient() {
        assert!(EmbedError::Backend("HTTP 503".to_string()).is_transient());
    }
}
