use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ContentHash, DocumentRecord};

/// Repository trait for document metadata
///
/// Ownership, folders and quotas belong to the surrounding application; this
/// port exposes only what ingestion and search need.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, id: Uuid) -> DomainResult<Option<DocumentRecord>>;

    async fn insert(&self, record: &DocumentRecord) -> DomainResult<()>;

    /// Delete a record. Returns the deleted record if it existed.
    async fn delete(&self, id: Uuid) -> DomainResult<Option<DocumentRecord>>;

    /// Persist the pooled embedding and content hash on a record.
    ///
    /// # Errors
    /// Returns `DocumentNotFound` if the record is gone.
    async fn set_embedding(
        &self,
        id: Uuid,
        hash: &ContentHash,
        embedding: &[f32],
    ) -> DomainResult<()>;

    /// Records with this content hash, optionally restricted to one owner,
    /// oldest first.
    async fn find_by_content_hash(
        &self,
        hash: &ContentHash,
        owner_id: Option<Uuid>,
    ) -> DomainResult<Vec<DocumentRecord>>;

    /// Number of records still referencing a content hash.
    async fn count_by_content_hash(&self, hash: &ContentHash) -> DomainResult<u64>;

    /// All document ids, optionally for one owner, oldest first.
    async fn list_ids(&self, owner_id: Option<Uuid>) -> DomainResult<Vec<Uuid>>;
}
