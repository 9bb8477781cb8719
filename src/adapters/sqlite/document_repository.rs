//! SQLite document metadata repository.
//!
//! Also serves as the secondary vector backend: each ingested record carries
//! its pooled embedding, and an ownership-scoped query scans those vectors.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{BackendError, DomainError, DomainResult};
use crate::domain::models::{
    bytes_to_embedding, embedding_to_bytes, squared_l2, ContentHash, DocumentRecord,
    ScoredDocument, VectorSearchQuery,
};
use crate::domain::ports::{DocumentStore, SecondaryVectorBackend};

#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentRepository {
    async fn find(&self, id: Uuid) -> DomainResult<Option<DocumentRecord>> {
        let row: Option<DocumentRow> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, record: &DocumentRecord) -> DomainResult<()> {
        let size_bytes = i64::try_from(record.size_bytes)
            .map_err(|_| DomainError::ValidationFailed(format!("size {} out of range", record.size_bytes)))?;
        let embedding = record.embedding.as_deref().map(embedding_to_bytes);
        let embedding_dim = record.embedding.as_ref().map(|e| e.len() as i64);

        sqlx::query(
            r#"INSERT INTO documents (id, owner_id, file_name, mime_type, size_bytes,
               content_hash, embedding, embedding_dim, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(record.id.to_string())
        .bind(record.owner_id.to_string())
        .bind(&record.file_name)
        .bind(&record.mime_type)
        .bind(size_bytes)
        .bind(record.content_hash.as_ref().map(ContentHash::as_str))
        .bind(embedding)
        .bind(embedding_dim)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<Option<DocumentRecord>> {
        let row: Option<DocumentRow> = sqlx::query_as("DELETE FROM documents WHERE id = ? RETURNING *")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn set_embedding(&self, id: Uuid, hash: &ContentHash, embedding: &[f32]) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE documents SET content_hash = ?, embedding = ?, embedding_dim = ?, updated_at = ?
               WHERE id = ?"#
        )
        .bind(hash.as_str())
        .bind(embedding_to_bytes(embedding))
        .bind(embedding.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn find_by_content_hash(&self, hash: &ContentHash, owner_id: Option<Uuid>) -> DomainResult<Vec<DocumentRecord>> {
        let rows: Vec<DocumentRow> = match owner_id {
            Some(owner) => {
                sqlx::query_as(
                    "SELECT * FROM documents WHERE content_hash = ? AND owner_id = ? ORDER BY created_at, id"
                )
                .bind(hash.as_str())
                .bind(owner.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM documents WHERE content_hash = ? ORDER BY created_at, id")
                    .bind(hash.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_by_content_hash(&self, hash: &ContentHash) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE content_hash = ?")
            .bind(hash.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_ids(&self, owner_id: Option<Uuid>) -> DomainResult<Vec<Uuid>> {
        let ids: Vec<(String,)> = match owner_id {
            Some(owner) => {
                sqlx::query_as("SELECT id FROM documents WHERE owner_id = ? ORDER BY created_at, id")
                    .bind(owner.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT id FROM documents ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        ids.iter().map(|(id,)| super::parse_uuid(id)).collect()
    }
}

#[async_trait]
impl SecondaryVectorBackend for SqliteDocumentRepository {
    /// Exact euclidean scan over the owner's embedded documents.
    ///
    /// Scores follow `1 / (1 + d²)`. Rows whose stored width differs from the
    /// query are skipped.
    async fn vector_search(&self, query: &VectorSearchQuery) -> Result<Vec<ScoredDocument>, BackendError> {
        if query.limit == 0 || query.vector.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<VectorRow> = sqlx::query_as(
            r#"SELECT id, file_name, embedding FROM documents
               WHERE owner_id = ? AND embedding IS NOT NULL AND embedding_dim = ?"#
        )
        .bind(query.owner_id.to_string())
        .bind(query.vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(embedding) = bytes_to_embedding(&row.embedding) else {
                tracing::warn!(document_id = %row.id, "Skipping malformed stored embedding");
                continue;
            };
            if embedding.len() != query.vector.len() {
                continue;
            }
            let document_id = super::parse_uuid(&row.id).map_err(|e| BackendError::Query(e.to_string()))?;
            scored.push(ScoredDocument {
                document_id,
                file_name: row.file_name,
                score: 1.0 / (1.0 + squared_l2(&query.vector, &embedding)),
            });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(query.limit);
        Ok(scored)
    }
}

#[derive(sqlx::FromRow)]
struct VectorRow {
    id: String,
    file_name: String,
    embedding: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    owner_id: String,
    file_name: String,
    mime_type: String,
    size_bytes: i64,
    content_hash: Option<String>,
    embedding: Option<Vec<u8>>,
    #[allow(dead_code)]
    embedding_dim: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = DomainError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let embedding = row
            .embedding
            .map(|bytes| {
                bytes_to_embedding(&bytes).ok_or_else(|| {
                    DomainError::SerializationError(format!("malformed embedding for document {}", row.id))
                })
            })
            .transpose()?;

        Ok(DocumentRecord {
            id: super::parse_uuid(&row.id)?,
            owner_id: super::parse_uuid(&row.owner_id)?,
            file_name: row.file_name,
            mime_type: row.mime_type,
            size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
            content_hash: row.content_hash.map(ContentHash::from_hex),
            embedding,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteDocumentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteDocumentRepository::new(pool)
    }

    async fn ingested(repo: &SqliteDocumentRepository, owner: Uuid, name: &str, bytes: &[u8], vector: Vec<f32>) -> DocumentRecord {
        let record = DocumentRecord::new(owner, name, "text/plain", bytes.len() as u64);
        repo.insert(&record).await.unwrap();
        repo.set_embedding(record.id, &ContentHash::of(bytes), &vector).await.unwrap();
        repo.find(record.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup().await;
        let record = DocumentRecord::new(Uuid::new_v4(), "notes.md", "text/markdown", 42);
        repo.insert(&record).await.unwrap();

        let found = repo.find(record.id).await.unwrap().unwrap();
        assert_eq!(found.file_name, "notes.md");
        assert_eq!(found.size_bytes, 42);
        assert!(found.content_hash.is_none());
        assert!(found.embedding.is_none());
        assert!(repo.find(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_embedding_persists_vector() {
        let repo = setup().await;
        let stored = ingested(&repo, Uuid::new_v4(), "a.txt", b"alpha", vec![0.25, -1.5, 3.0]).await;

        assert!(stored.is_ingested());
        assert_eq!(stored.embedding.as_deref(), Some(&[0.25, -1.5, 3.0][..]));
        assert_eq!(stored.content_hash, Some(ContentHash::of(b"alpha")));
    }

    #[tokio::test]
    async fn test_set_embedding_missing_document() {
        let repo = setup().await;
        let err = repo
            .set_embedding(Uuid::new_v4(), &ContentHash::of(b"x"), &[1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_content_hash_lookup_and_count() {
        let repo = setup().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        ingested(&repo, alice, "a.txt", b"shared", vec![1.0]).await;
        ingested(&repo, bob, "b.txt", b"shared", vec![1.0]).await;

        let hash = ContentHash::of(b"shared");
        assert_eq!(repo.count_by_content_hash(&hash).await.unwrap(), 2);
        assert_eq!(repo.find_by_content_hash(&hash, None).await.unwrap().len(), 2);

        let owned = repo.find_by_content_hash(&hash, Some(alice)).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].file_name, "a.txt");
    }

    #[tokio::test]
    async fn test_delete_returns_record() {
        let repo = setup().await;
        let record = ingested(&repo, Uuid::new_v4(), "a.txt", b"bytes", vec![1.0]).await;

        let deleted = repo.delete(record.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(repo.delete(record.id).await.unwrap().is_none());
        assert_eq!(repo.count_by_content_hash(&ContentHash::of(b"bytes")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vector_search_is_owner_scoped() {
        let repo = setup().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let near = ingested(&repo, alice, "near.txt", b"near", vec![1.0, 0.0]).await;
        let far = ingested(&repo, alice, "far.txt", b"far", vec![0.0, 3.0]).await;
        ingested(&repo, bob, "other.txt", b"other", vec![1.0, 0.0]).await;

        let results = repo
            .vector_search(&VectorSearchQuery {
                vector: vec![1.0, 0.0],
                num_candidates: 100,
                limit: 5,
                owner_id: alice,
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, near.id);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].document_id, far.id);
        // squared distance 1 + 9 = 10
        assert!((results[1].score - 1.0 / 11.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_vector_search_skips_unembedded_and_mismatched() {
        let repo = setup().await;
        let owner = Uuid::new_v4();
        repo.insert(&DocumentRecord::new(owner, "pending.txt", "text/plain", 1)).await.unwrap();
        ingested(&repo, owner, "wide.txt", b"wide", vec![1.0, 0.0, 0.0]).await;

        let results = repo
            .vector_search(&VectorSearchQuery {
                vector: vec![1.0, 0.0],
                num_candidates: 10,
                limit: 5,
                owner_id: owner,
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_list_ids_oldest_first() {
        let repo = setup().await;
        let owner = Uuid::new_v4();
        let mut first = DocumentRecord::new(owner, "1.txt", "text/plain", 1);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = DocumentRecord::new(owner, "2.txt", "text/plain", 1);
        repo.insert(&second).await.unwrap();
        repo.insert(&first).await.unwrap();
        repo.insert(&DocumentRecord::new(Uuid::new_v4(), "x.txt", "text/plain", 1)).await.unwrap();

        assert_eq!(repo.list_ids(Some(owner)).await.unwrap(), vec![first.id, second.id]);
        assert_eq!(repo.list_ids(None).await.unwrap().len(), 3);
    }
}
