//! Vector search ports for the primary index and the secondary fallback.

use async_trait::async_trait;

use crate::domain::errors::BackendError;
use crate::domain::models::{IndexSpec, KnnMatch, ScoredDocument, VectorSearchQuery};

/// Fast vector index over cache entries.
#[async_trait]
pub trait PrimaryVectorBackend: Send + Sync {
    /// Create the index if it does not exist. Idempotent.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), BackendError>;

    /// Nearest neighbours by euclidean distance, closest first.
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<KnnMatch>, BackendError>;
}

/// Slower ownership-aware vector search over document metadata.
#[async_trait]
pub trait SecondaryVectorBackend: Send + Sync {
    /// Scored documents, best first, restricted to `query.owner_id`.
    async fn vector_search(
        &self,
        query: &VectorSearchQuery,
    ) -> Result<Vec<ScoredDocument>, BackendError>;
}
