/// All errors that can be returned by a PipelineStorage implementation.
///
/// A missing record is never an error: lookups return `Ok(None)` and callers
/// decide what absence means for them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backing store is temporarily unreachable (throttling, connection
    /// loss, lock timeout). This is the only class a caller may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific, non-retryable failure (bad path, permissions,
    /// corrupted state file, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
