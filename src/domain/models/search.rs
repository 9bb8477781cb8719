//! Search request and result models shared by both backends.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ownership scope applied to every search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
    pub owner_id: Uuid,
}

impl SearchScope {
    pub const fn owner(owner_id: Uuid) -> Self {
        Self { owner_id }
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: Uuid,
    pub file_name: String,
    /// Normalized into `[0, 1]`
    pub score: f32,
}

/// Which backend answered a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Primary,
    Fallback,
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Ranked hits plus the backend that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub source: SearchSource,
}

/// A raw nearest-neighbour match from the primary index
#[derive(Debug, Clone, PartialEq)]
pub struct KnnMatch {
    /// Cache key (`prefix + content_hash`)
    pub key: String,
    /// Euclidean distance from the query
    pub distance: f32,
}

/// A document scored natively by the secondary backend
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document_id: Uuid,
    pub file_name: String,
    pub score: f32,
}

/// Ownership-scoped vector query for the secondary backend
#[derive(Debug, Clone)]
pub struct VectorSearchQuery {
    pub vector: Vec<f32>,
    pub num_candidates: usize,
    pub limit: usize,
    pub owner_id: Uuid,
}

/// Distance metric of a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    L2,
}

/// Definition of the primary vector index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    /// Only keys with this prefix are indexed
    pub prefix: String,
    pub dimensions: usize,
    pub metric: DistanceMetric,
}
