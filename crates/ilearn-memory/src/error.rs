//! Error types for the memory crate.

use ilearn_embed::EmbedError;
use thiserror::Error;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The embedding provider is missing or failed to load. Fatal to
    /// initialization; the store degrades to empty reads and rejected writes.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Persistence is not usable (missing credentials, repository name, or
    /// unsupported operation). The in-memory state still updates.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single input item could not be used (bad JSON, missing keys,
    /// missing rule tag).
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A backend call failed in a way that may succeed later.
    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The embedding provider returned an error.
    #[error("Embedding error: {0}")]
    Embedding(#[source] EmbedError),

    /// A vector did not match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Index dimension.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The collection has not been initialized.
    #[error("Collection '{0}' is not initialized")]
    NotInitialized(String),

    /// A blocking task panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EmbedError> for MemoryError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::Unavailable(msg) => MemoryError::ProviderUnavailable(msg),
            other => MemoryError::Embedding(other),
        }
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::Internal(err.to_string())
    }
}

impl MemoryError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MemoryError::TransientBackend(_) => true,
            MemoryError::Http(e) => e.is_timeout() || e.is_connect(),
            MemoryError::Embedding(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_embedder_maps_to_provider_unavailable() {
        let err: MemoryError = EmbedError::Unavailable("model missing".to_string()).into();
        assert!(matches!(err, MemoryError::ProviderUnavailable(ref m) if m == "model missing"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_other_embed_errors_keep_their_source() {
        let err: MemoryError = EmbedError::Backend("503".to_string()).into();
        assert!(matches!(err, MemoryError::Embedding(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_backend_display() {
        let err = MemoryError::TransientBackend("timed out".to_string());
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Transient backend error: timed out");
    }
}
