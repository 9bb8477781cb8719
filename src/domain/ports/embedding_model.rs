//! Embedding model port.
//!
//! The encoder resource manager owns the lifecycle; implementations only
//! know how to load weights and turn text into vectors. Both calls are
//! synchronous and CPU-bound, the manager moves them onto the blocking pool.

use std::sync::Arc;

use crate::domain::errors::EncoderError;

/// A resident, ready-to-use embedding model.
pub trait EmbeddingModel: Send + Sync {
    /// Width of every vector this model produces.
    fn dimensions(&self) -> usize;

    /// Encode a batch of texts, one vector per input, in input order.
    ///
    /// Implementations report allocator exhaustion as
    /// [`EncoderError::OutOfMemory`] and any other failure as
    /// [`EncoderError::EncodingFailed`].
    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Produces fresh model instances on demand.
pub trait ModelLoader: Send + Sync {
    /// Identifier used in logs.
    fn model_name(&self) -> &str;

    /// Dimension the loaded model is expected to report.
    fn dimensions(&self) -> usize;

    /// Load weights into memory.
    fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError>;
}
