//! Domain errors for the vaultsearch embedding and search core.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the metadata and blob store collaborators.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Failures of the encoder resource manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoderError {
    /// `embed` was called with no inputs.
    #[error("Cannot encode an empty batch")]
    EmptyInput,

    /// The model produced an error or a malformed batch.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The model produced vectors of the wrong width.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Raised by a model or loader when the allocator gives up.
    ///
    /// The manager retries a load once after an unload cycle and then reports
    /// [`EncoderError::ResourceExhausted`].
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Memory could not be reclaimed for the model.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Failed to load model '{model_name}': {reason}")]
    ModelLoad { model_name: String, reason: String },

    /// The manager has been shut down and refuses new leases.
    #[error("Encoder is shutting down")]
    ShuttingDown,
}

/// Failures reported by a vector search backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Connectivity failure or missing index.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed to run the query.
    #[error("Backend query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                BackendError::Unavailable(err.to_string())
            }
            other => BackendError::Query(other.to_string()),
        }
    }
}

/// Failures of the content-addressed cache store.
///
/// `Unavailable` is for remote stores that lose their connection; the
/// in-process cache only ever reports `Corrupt`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failures of admission into a budget pool.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BudgetError {
    #[error("Invalid budget: total {total} with ratio {ratio} leaves a pool empty")]
    InvalidSplit { total: usize, ratio: f64 },

    #[error("Budget pool '{0}' is closed")]
    Closed(&'static str),
}

/// Text extraction failures. Logged by the pipeline and treated as empty text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),

    #[error("Failed to parse CSV: {0}")]
    Csv(String),
}

/// Errors that abort a single ingestion attempt.
///
/// These never escape [`crate::services::IngestionService::ingest`]; they are
/// logged with the document id and folded into an outcome.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] DomainError),

    #[error(transparent)]
    Encoding(#[from] EncoderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Encoder returned no vectors for {0} chunks")]
    EmptyPool(usize),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Errors surfaced to search callers.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Query encoding failed: {0}")]
    Encoding(#[from] EncoderError),

    /// The fallback backend failed after the primary did. There is no third tier.
    #[error("Secondary backend unavailable: {0}")]
    SecondaryUnavailable(BackendError),

    #[error("Metadata store error: {0}")]
    Store(#[from] DomainError),

    #[error(transparent)]
    Budget(#[from] BudgetError),
}

impl SearchError {
    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Encoding(EncoderError::EncodingFailed(_) | EncoderError::ResourceExhausted(_))
            | Self::SecondaryUnavailable(_) => true,
            Self::Encoding(_) | Self::EmptyQuery | Self::Store(_) | Self::Budget(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_retryability() {
        assert!(SearchError::Encoding(EncoderError::EncodingFailed("boom".into())).is_retryable());
        assert!(SearchError::SecondaryUnavailable(BackendError::Unavailable("down".into()))
            .is_retryable());
        assert!(!SearchError::EmptyQuery.is_retryable());
        assert!(!SearchError::Encoding(EncoderError::ShuttingDown).is_retryable());
    }

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        let err = BackendError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, BackendError::Unavailable(_)));

        let err = BackendError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, BackendError::Query(_)));
    }
}
