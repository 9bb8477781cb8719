//! Semantic search with primary-to-secondary fallback.
//!
//! The query is embedded once. The primary index answers unless it errors,
//! in which case the same vector is sent to the secondary backend and the
//! returned documents are scheduled for resync into the primary.
//!
//! The primary index is shared by every owner, so its nearest neighbours are
//! fetched in growing batches (doubling from `top_k` up to `num_candidates`)
//! until enough of them belong to the caller or the index runs out.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{EncoderError, SearchError};
use crate::domain::models::{
    ContentHash, KnnMatch, SearchConfig, SearchHit, SearchResponse, SearchScope, SearchSource,
    VectorSearchQuery,
};
use crate::domain::ports::{CacheStore, DocumentStore, PrimaryVectorBackend, SecondaryVectorBackend};
use crate::services::concurrency_budget::ConcurrencyBudget;
use crate::services::encoder_manager::EncoderManager;
use crate::services::ingestion_service::IngestionService;
use crate::services::scoring::{distance_to_score, finalize_hits};

/// Storage collaborators consulted by a search
#[derive(Clone)]
pub struct SearchBackends {
    pub primary: Arc<dyn PrimaryVectorBackend>,
    pub cache: Arc<dyn CacheStore>,
    pub secondary: Arc<dyn SecondaryVectorBackend>,
    pub documents: Arc<dyn DocumentStore>,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub top_k: usize,
    pub num_candidates: usize,
    pub cache_prefix: String,
}

impl SearchSettings {
    pub fn from_config(config: &SearchConfig, cache_prefix: impl Into<String>) -> Self {
        Self {
            top_k: config.top_k,
            num_candidates: config.num_candidates,
            cache_prefix: cache_prefix.into(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), "doc:")
    }
}

/// Trim and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct SearchService {
    backends: SearchBackends,
    encoder: EncoderManager,
    budget: ConcurrencyBudget,
    ingestion: IngestionService,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(
        backends: SearchBackends,
        encoder: EncoderManager,
        budget: ConcurrencyBudget,
        ingestion: IngestionService,
        settings: SearchSettings,
    ) -> Self {
        Self {
            backends,
            encoder,
            budget,
            ingestion,
            settings,
        }
    }

    /// Rank the caller's documents against `query`.
    ///
    /// Returns at most `top_k` unique documents with scores in `[0, 1]`.
    /// A primary failure is absorbed by the fallback; only a secondary
    /// failure or an encoding failure reaches the caller.
    pub async fn search(&self, query: &str, scope: SearchScope) -> Result<SearchResponse, SearchError> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let _permit = self.budget.acquire_search().await?;

        let vector = self
            .encoder
            .embed(std::slice::from_ref(&query), true)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EncodingFailed("no vector for query".to_string()))?;

        let mut k = self.settings.top_k;
        let ceiling = self.settings.num_candidates.max(self.settings.top_k);
        loop {
            let matches = match self.backends.primary.knn(&vector, k).await {
                Ok(matches) => matches,
                Err(error) => {
                    tracing::warn!(%error, owner_id = %scope.owner_id, "Primary search failed, using fallback");
                    return self.fallback(vector, scope).await;
                }
            };

            let exhausted = matches.len() < k;
            let (hits, used) = self.resolve_primary(&matches, scope).await?;
            let owned = hits.iter().map(|h| h.document_id).collect::<HashSet<_>>().len();
            if owned >= self.settings.top_k || exhausted || k >= ceiling {
                self.touch(&used).await;
                tracing::debug!(owner_id = %scope.owner_id, hits = owned, candidates = matches.len(), "Primary search");
                return Ok(SearchResponse {
                    hits: finalize_hits(hits, self.settings.top_k),
                    source: SearchSource::Primary,
                });
            }
            k = k.saturating_mul(2).min(ceiling);
        }
    }

    /// Wait for resync tasks scheduled by fallback searches.
    pub async fn drain_background(&self) {
        self.ingestion.drain().await;
    }

    /// Owned hits for `matches`, plus the keys that produced at least one hit.
    async fn resolve_primary(
        &self,
        matches: &[KnnMatch],
        scope: SearchScope,
    ) -> Result<(Vec<SearchHit>, Vec<String>), SearchError> {
        let mut hits = Vec::with_capacity(matches.len());
        let mut used = Vec::new();
        for knn in matches {
            let Some(hash) = ContentHash::from_cache_key(&knn.key, &self.settings.cache_prefix) else {
                tracing::debug!(key = %knn.key, "Ignoring foreign key in primary results");
                continue;
            };
            let owned = self
                .backends
                .documents
                .find_by_content_hash(&hash, Some(scope.owner_id))
                .await?;
            if owned.is_empty() {
                continue;
            }
            let score = distance_to_score(knn.distance);
            used.push(knn.key.clone());
            hits.extend(owned.into_iter().map(|doc| SearchHit {
                document_id: doc.id,
                file_name: doc.file_name,
                score,
            }));
        }
        Ok((hits, used))
    }

    /// Refresh recency of the entries a search used. Failures are logged only.
    async fn touch(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(error) = self.backends.cache.touch(keys).await {
            tracing::warn!(%error, keys = keys.len(), "Failed to touch cache entries");
        }
    }

    async fn fallback(&self, vector: Vec<f32>, scope: SearchScope) -> Result<SearchResponse, SearchError> {
        let query = VectorSearchQuery {
            vector,
            num_candidates: self.settings.num_candidates,
            limit: self.settings.top_k,
            owner_id: scope.owner_id,
        };
        let scored = self
            .backends
            .secondary
            .vector_search(&query)
            .await
            .map_err(SearchError::SecondaryUnavailable)?;

        let ids: Vec<Uuid> = scored.iter().map(|d| d.document_id).collect();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Scheduling resync of fallback results");
            let _handle = self.ingestion.spawn_resync(ids);
        }

        let hits = scored
            .into_iter()
            .map(|doc| SearchHit {
                document_id: doc.document_id,
                file_name: doc.file_name,
                score: doc.score,
            })
            .collect();

        Ok(SearchResponse {
            hits: finalize_hits(hits, self.settings.top_k),
            source: SearchSource::Fallback,
        })
    }
}
