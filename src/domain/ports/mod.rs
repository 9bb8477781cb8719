//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these traits; services depend only on them:
//! - EmbeddingModel / ModelLoader: model weights and inference
//! - PressureSignal: process memory readings
//! - CacheStore / PrimaryVectorBackend: content-addressed vector cache
//! - SecondaryVectorBackend: ownership-scoped fallback search
//! - DocumentStore / BlobStore: metadata and raw bytes

pub mod blob_store;
pub mod cache_store;
pub mod document_store;
pub mod embedding_model;
pub mod pressure;
pub mod vector_backend;

pub use blob_store::BlobStore;
pub use cache_store::CacheStore;
pub use document_store::DocumentStore;
pub use embedding_model::{EmbeddingModel, ModelLoader};
pub use pressure::{NoPressure, PressureSignal};
pub use vector_backend::{PrimaryVectorBackend, SecondaryVectorBackend};
