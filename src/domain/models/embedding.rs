//! Embedding domain models
//!
//! Model selection and the on-wire representation of embedding vectors.

use serde::{Deserialize, Serialize};

/// Embedding model backends supported by the encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingModelKind {
    /// Deterministic feature-hashing encoder
    /// - Dimensions: 384
    /// - No download, no GPU
    /// - Lexical rather than semantic similarity
    #[default]
    Hashing,

    /// Local MiniLM model (all-MiniLM-L6-v2), requires the `bert` feature
    /// - Dimensions: 384
    /// - Size: ~80MB
    #[serde(rename = "local_minilm")]
    LocalMiniLM,

    /// Local MPNet model (all-mpnet-base-v2), requires the `bert` feature
    /// - Dimensions: 768
    /// - Size: ~420MB
    #[serde(rename = "local_mpnet")]
    LocalMPNet,
}

impl EmbeddingModelKind {
    /// Returns the vector dimensions for this model
    pub const fn dimensions(&self) -> usize {
        match self {
            Self::Hashing | Self::LocalMiniLM => 384,
            Self::LocalMPNet => 768,
        }
    }

    /// Returns the HuggingFace model name or identifier
    pub const fn model_name(&self) -> &'static str {
        match self {
            Self::Hashing => "feature-hashing-384",
            Self::LocalMiniLM => "sentence-transformers/all-MiniLM-L6-v2",
            Self::LocalMPNet => "sentence-transformers/all-mpnet-base-v2",
        }
    }

    /// Returns true if the model weights come from HuggingFace
    pub const fn requires_download(&self) -> bool {
        matches!(self, Self::LocalMiniLM | Self::LocalMPNet)
    }
}

impl std::fmt::Display for EmbeddingModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashing => write!(f, "feature hashing (built-in)"),
            Self::LocalMiniLM => write!(f, "all-MiniLM-L6-v2 (local)"),
            Self::LocalMPNet => write!(f, "all-mpnet-base-v2 (local)"),
        }
    }
}

/// Serialize a vector as little-endian `f32` bytes.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`]. Returns `None` when the length is not a
/// multiple of four.
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Squared euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
