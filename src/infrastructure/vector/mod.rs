//! Embedding model implementations and the memory pressure signal.

#[cfg(feature = "bert")]
pub mod bert_error;
#[cfg(feature = "bert")]
pub mod bert_model;
pub mod hashing_model;
pub mod memory_pressure;

#[cfg(feature = "bert")]
pub use bert_model::{BertEmbeddingModel, BertModelLoader};
pub use hashing_model::{HashingEmbeddingModel, HashingModelLoader};
pub use memory_pressure::ProcessMemoryPressure;
