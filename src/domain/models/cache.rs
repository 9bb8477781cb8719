use serde::{Deserialize, Serialize};

use super::embedding::{bytes_to_embedding, embedding_to_bytes};

/// Content-addressed cache entry, one per unique document hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Little-endian `f32` embedding bytes
    pub embedding: Vec<u8>,
    /// Display name of the first document that published this hash
    pub file_name: String,
    /// Leading text of the document
    pub snippet: Option<String>,
}

impl CacheEntry {
    pub fn new(embedding: &[f32], file_name: impl Into<String>, snippet: Option<String>) -> Self {
        Self {
            embedding: embedding_to_bytes(embedding),
            file_name: file_name.into(),
            snippet,
        }
    }

    /// Decode the stored vector. `None` if the bytes are malformed.
    pub fn vector(&self) -> Option<Vec<f32>> {
        bytes_to_embedding(&self.embedding)
    }
}
