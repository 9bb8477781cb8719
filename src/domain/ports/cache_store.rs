//! Content-addressed cache port (the primary store's key/value side).

use async_trait::async_trait;

use crate::domain::errors::CacheError;
use crate::domain::models::CacheEntry;

/// Key/value store holding one [`CacheEntry`] per content hash.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Existence check used before publishing.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Atomically insert `entry` unless `key` is already present.
    ///
    /// Returns `true` if this call created the entry, `false` if another
    /// writer got there first. The existing entry is never overwritten.
    async fn write_if_absent(&self, key: &str, entry: CacheEntry) -> Result<bool, CacheError>;

    /// Fetch an entry. Fails with `CacheError::Corrupt` if its vector does
    /// not decode.
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Remove an entry. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Refresh recency for LRU-style retention.
    async fn touch(&self, keys: &[String]) -> Result<(), CacheError>;
}
