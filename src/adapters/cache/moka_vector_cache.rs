//! In-process primary vector store backed by a moka cache.
//!
//! Entries are keyed by `prefix + content_hash`. Reads and `touch` refresh an
//! entry's idle clock, so the cache behaves as an LRU with time-to-idle
//! expiry. KNN is an exact L2 scan over the resident entries that carry the
//! index prefix.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::domain::errors::{BackendError, CacheError};
use crate::domain::models::{squared_l2, CacheConfig, CacheEntry, IndexSpec, KnnMatch};
use crate::domain::ports::{CacheStore, PrimaryVectorBackend};

/// Content-addressed vector cache with a single vector index
pub struct MokaVectorCache {
    entries: Cache<String, Arc<CacheEntry>>,
    index: RwLock<Option<IndexSpec>>,
}

impl MokaVectorCache {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(time_to_idle)
            .build();
        Self {
            entries,
            index: RwLock::new(None),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_capacity,
            Duration::from_secs(config.time_to_idle_secs),
        )
    }

    /// Approximate number of resident entries.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop the index definition. KNN fails until it is recreated.
    pub fn drop_index(&self) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current_index(&self) -> Option<IndexSpec> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CacheStore for MokaVectorCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.contains_key(key))
    }

    async fn write_if_absent(&self, key: &str, entry: CacheEntry) -> Result<bool, CacheError> {
        let inserted = self
            .entries
            .entry(key.to_string())
            .or_insert(Arc::new(entry))
            .await;
        Ok(inserted.is_fresh())
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(entry) = self.entries.get(key).await else {
            return Ok(None);
        };
        if entry.vector().is_none() {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                reason: format!("{} embedding bytes do not form f32 values", entry.embedding.len()),
            });
        }
        Ok(Some((*entry).clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn touch(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            // a read resets the time-to-idle clock
            let _ = self.entries.get(key).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PrimaryVectorBackend for MokaVectorCache {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), BackendError> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        match index.as_ref() {
            Some(existing) if existing == spec => {
                tracing::debug!(index = %spec.name, "Vector index already exists");
            }
            Some(existing) => {
                tracing::warn!(
                    index = %spec.name,
                    old_dimensions = existing.dimensions,
                    new_dimensions = spec.dimensions,
                    "Replacing vector index definition"
                );
                *index = Some(spec.clone());
            }
            None => {
                tracing::info!(index = %spec.name, dimensions = spec.dimensions, "Created vector index");
                *index = Some(spec.clone());
            }
        }
        Ok(())
    }

    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<KnnMatch>, BackendError> {
        let spec = self
            .current_index()
            .ok_or_else(|| BackendError::Unavailable("vector index does not exist".to_string()))?;

        if vector.len() != spec.dimensions {
            return Err(BackendError::Query(format!(
                "query has {} dimensions, index '{}' expects {}",
                vector.len(),
                spec.name,
                spec.dimensions
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut matches: Vec<KnnMatch> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(&spec.prefix))
            .filter_map(|(key, entry)| {
                let stored = entry.vector()?;
                (stored.len() == spec.dimensions).then(|| KnnMatch {
                    key: (*key).clone(),
                    distance: squared_l2(vector, &stored).sqrt(),
                })
            })
            .collect();

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DistanceMetric;

    fn spec(dimensions: usize) -> IndexSpec {
        IndexSpec {
            name: "doc_index".to_string(),
            prefix: "doc:".to_string(),
            dimensions,
            metric: DistanceMetric::L2,
        }
    }

    fn cache() -> MokaVectorCache {
        MokaVectorCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_write_if_absent_first_writer_wins() {
        let cache = cache();
        assert!(cache
            .write_if_absent("doc:a", CacheEntry::new(&[1.0], "first.txt", None))
            .await
            .unwrap());
        assert!(!cache
            .write_if_absent("doc:a", CacheEntry::new(&[2.0], "second.txt", None))
            .await
            .unwrap());

        let stored = cache.read("doc:a").await.unwrap().unwrap();
        assert_eq!(stored.file_name, "first.txt");
        assert!(cache.exists("doc:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_reports_malformed_vector() {
        let cache = cache();
        let mut entry = CacheEntry::new(&[1.0, 2.0], "bad.txt", None);
        entry.embedding.pop();
        cache.write_if_absent("doc:bad", entry).await.unwrap();

        let err = cache.read("doc:bad").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { ref key, .. } if key == "doc:bad"));
        assert!(cache.read("doc:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = cache();
        cache
            .write_if_absent("doc:a", CacheEntry::new(&[1.0], "a", None))
            .await
            .unwrap();
        assert!(cache.delete("doc:a").await.unwrap());
        assert!(!cache.delete("doc:a").await.unwrap());
        assert!(!cache.exists("doc:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_knn_without_index_is_unavailable() {
        let cache = cache();
        let err = cache.knn(&[0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_knn_orders_by_distance() {
        let cache = cache();
        cache.ensure_index(&spec(2)).await.unwrap();
        cache.ensure_index(&spec(2)).await.unwrap();

        for (key, v) in [("doc:far", [3.0, 4.0]), ("doc:near", [0.0, 1.0]), ("doc:same", [0.0, 0.0])] {
            cache
                .write_if_absent(key, CacheEntry::new(&v, key, None))
                .await
                .unwrap();
        }
        cache
            .write_if_absent("other:x", CacheEntry::new(&[0.0, 0.0], "x", None))
            .await
            .unwrap();

        let matches = cache.knn(&[0.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].key, "doc:same");
        assert!(matches[0].distance.abs() < f32::EPSILON);
        assert_eq!(matches[1].key, "doc:near");
        assert!((matches[1].distance - 1.0).abs() < 1e-6);

        let all = cache.knn(&[0.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!((all[2].distance - 5.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_knn_rejects_wrong_width() {
        let cache = cache();
        cache.ensure_index(&spec(3)).await.unwrap();
        assert!(matches!(
            cache.knn(&[0.0], 1).await.unwrap_err(),
            BackendError::Query(_)
        ));
    }

    #[tokio::test]
    async fn test_dropped_index_is_unavailable() {
        let cache = cache();
        cache.ensure_index(&spec(2)).await.unwrap();
        cache.drop_index();
        assert!(matches!(
            cache.knn(&[0.0, 0.0], 1).await.unwrap_err(),
            BackendError::Unavailable(_)
        ));
    }
}
