use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Object storage for raw document bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> DomainResult<()>;

    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> DomainResult<bool>;
}
