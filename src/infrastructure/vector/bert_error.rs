use thiserror::Error;

use crate::domain::errors::EncoderError;

/// Errors that can occur while loading or running the BERT encoder
///
/// These are folded into [`EncoderError`] at the model port boundary so the
/// resource manager can tell allocator exhaustion apart from other failures.
#[derive(Error, Debug)]
pub enum BertError {
    /// Model file download or loading failed
    ///
    /// Covers HuggingFace Hub API errors, network failures and corrupted
    /// weight files.
    #[error("Failed to load model '{model_name}': {reason}")]
    ModelLoadError {
        /// The name/identifier of the model that failed to load
        model_name: String,
        /// The specific reason for the failure
        reason: String,
    },

    /// HuggingFace Hub API error
    #[error("HuggingFace Hub API error: {0}")]
    HubApiError(#[from] hf_hub::api::sync::ApiError),

    /// File system I/O error during model operations
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Tokenization of input text failed
    #[error("Tokenization failed: {0}")]
    TokenizationError(String),

    /// Candle tensor operation error
    #[error("Tensor operation error: {0}")]
    CandleError(#[from] candle_core::Error),

    /// Device ran out of memory during the named operation
    #[error("Out of memory during {operation}")]
    OutOfMemory {
        /// The operation that triggered OOM
        operation: String,
    },

    /// The loaded config does not match the expected embedding width
    #[error("Invalid embedding dimensions: expected {expected}, got {actual}")]
    InvalidDimensions {
        /// Expected embedding dimension
        expected: usize,
        /// Actual embedding dimension
        actual: usize,
    },

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BertError {
    /// Whether the error text indicates an allocator failure.
    ///
    /// Candle surfaces CUDA and Metal allocation failures as plain strings, so
    /// this is necessarily a text match.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::OutOfMemory { .. } => true,
            Self::CandleError(e) => looks_like_oom(&e.to_string()),
            Self::IoError(e) => e.kind() == std::io::ErrorKind::OutOfMemory,
            _ => false,
        }
    }

    /// Attach an operation name, promoting allocator failures to `OutOfMemory`.
    pub fn during(self, operation: &str) -> Self {
        if self.is_out_of_memory() {
            Self::OutOfMemory {
                operation: operation.to_string(),
            }
        } else {
            self
        }
    }
}

fn looks_like_oom(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("out of memory") || lower.contains("cuda_error_out_of_memory")
}

impl From<BertError> for EncoderError {
    fn from(err: BertError) -> Self {
        match err {
            e if e.is_out_of_memory() => Self::OutOfMemory(e.to_string()),
            BertError::InvalidDimensions { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            BertError::ModelLoadError { model_name, reason } => {
                Self::ModelLoad { model_name, reason }
            }
            other => Self::EncodingFailed(other.to_string()),
        }
    }
}
