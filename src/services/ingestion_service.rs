//! Document ingestion into the content-addressed vector cache.
//!
//! `ingest` runs extract, hash, sample, encode, persist and publish for a
//! single document. It is idempotent per content hash and never returns an
//! error: failures are logged with the document id and reported as an
//! [`IngestOutcome`].

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::domain::errors::{CacheError, IngestError, IngestResult};
use crate::domain::models::{CacheEntry, ContentHash, DocumentRecord, SamplingConfig};
use crate::domain::ports::{BlobStore, CacheStore, DocumentStore};
use crate::infrastructure::extraction::TextExtractor;
use crate::services::concurrency_budget::ConcurrencyBudget;
use crate::services::encoder_manager::EncoderManager;
use crate::services::sampling::{mean_pool, sample_chunks, snippet};

/// Why a document was left out of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No metadata record with this id
    DocumentMissing,
    /// The record exists but its bytes are gone
    BlobMissing,
    /// Unsupported type, unreadable file, or no words
    ExtractionEmpty,
}

/// Result of one ingestion attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// This call created the cache entry
    Cached(ContentHash),
    /// The vector was stored on the record; an entry for the hash already existed
    Deduplicated(ContentHash),
    Skipped(SkipReason),
    Failed,
}

impl IngestOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Cached(_) | Self::Deduplicated(_))
    }
}

/// Counts from a resync batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Total ids processed
    pub total: usize,
    /// Cache entries republished from stored vectors
    pub published: usize,
    /// Documents that went through the full ingest again
    pub reingested: usize,
    /// Nothing to do: entry already present or document unusable
    pub skipped: usize,
    pub failed: usize,
}

/// Tunables for ingestion
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub sampling: SamplingConfig,
    pub cache_prefix: String,
    pub normalize: bool,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            cache_prefix: "doc:".to_string(),
            normalize: true,
        }
    }
}

enum ResyncAction {
    Published,
    AlreadyCached,
    Reingested(IngestOutcome),
}

/// Ingestion pipeline. Cloning shares every collaborator.
#[derive(Clone)]
pub struct IngestionService {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<dyn CacheStore>,
    encoder: EncoderManager,
    budget: ConcurrencyBudget,
    extractor: TextExtractor,
    settings: Arc<IngestionSettings>,
    tracker: TaskTracker,
}

impl IngestionService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn CacheStore>,
        encoder: EncoderManager,
        budget: ConcurrencyBudget,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            documents,
            blobs,
            cache,
            encoder,
            budget,
            extractor: TextExtractor::new(),
            settings: Arc::new(settings),
            tracker: TaskTracker::new(),
        }
    }

    pub fn cache_prefix(&self) -> &str {
        &self.settings.cache_prefix
    }

    /// Ingest one document. Never fails; see [`IngestOutcome`].
    pub async fn ingest(&self, document_id: Uuid) -> IngestOutcome {
        match self.try_ingest(document_id).await {
            Ok(outcome) => {
                match &outcome {
                    IngestOutcome::Cached(hash) => {
                        tracing::info!(%document_id, content_hash = %hash, "Document cached");
                    }
                    IngestOutcome::Deduplicated(hash) => {
                        tracing::debug!(%document_id, content_hash = %hash, "Cache entry already present");
                    }
                    IngestOutcome::Skipped(reason) => {
                        tracing::info!(%document_id, ?reason, "Skipping ingestion");
                    }
                    IngestOutcome::Failed => {}
                }
                outcome
            }
            Err(error) => {
                tracing::error!(%document_id, %error, "Failed to ingest document");
                IngestOutcome::Failed
            }
        }
    }

    /// The pipeline proper. Errors here are folded into `Failed` by [`Self::ingest`].
    pub async fn try_ingest(&self, document_id: Uuid) -> IngestResult<IngestOutcome> {
        let Some(record) = self.documents.find(document_id).await? else {
            return Ok(IngestOutcome::Skipped(SkipReason::DocumentMissing));
        };
        let Some(bytes) = self.blobs.get(&record.blob_key()).await? else {
            return Ok(IngestOutcome::Skipped(SkipReason::BlobMissing));
        };

        let hash = ContentHash::of(&bytes);
        if let Some(vector) = self.cached_vector(&hash).await {
            self.documents
                .set_embedding(document_id, &hash, &vector)
                .await?;
            return Ok(IngestOutcome::Deduplicated(hash));
        }

        let text = self.extract(&record, bytes.clone()).await;
        if text.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::ExtractionEmpty));
        }

        let chunks = sample_chunks(&text, &self.settings.sampling);
        if chunks.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::ExtractionEmpty));
        }

        let _permit = self.budget.acquire_ingest().await?;

        let vectors = self.encoder.embed(&chunks, self.settings.normalize).await?;
        let embedding = mean_pool(&vectors).ok_or(IngestError::EmptyPool(chunks.len()))?;

        // the record keeps its vector even if the cache write below loses a race
        self.documents
            .set_embedding(document_id, &hash, &embedding)
            .await?;

        let entry = CacheEntry::new(
            &embedding,
            record.file_name.clone(),
            snippet(&text, self.settings.sampling.snippet_chars),
        );
        if self.publish(&hash, entry).await? {
            Ok(IngestOutcome::Cached(hash))
        } else {
            Ok(IngestOutcome::Deduplicated(hash))
        }
    }

    /// Fire-and-forget ingestion for upload handlers.
    pub fn spawn_ingest(&self, document_id: Uuid) -> JoinHandle<IngestOutcome> {
        let this = self.clone();
        self.tracker
            .spawn(async move { this.ingest(document_id).await })
    }

    /// Make sure each document has a cache entry.
    ///
    /// Records that already carry a vector are republished without
    /// re-encoding; the rest go through [`Self::ingest`]. Ids are processed
    /// concurrently, bounded by the ingest pool.
    pub async fn resync(&self, document_ids: &[Uuid]) -> ResyncReport {
        tracing::info!(count = document_ids.len(), "Resync started");

        let results = join_all(document_ids.iter().map(|id| self.resync_one(*id))).await;

        let mut report = ResyncReport {
            total: document_ids.len(),
            ..ResyncReport::default()
        };
        for (document_id, result) in document_ids.iter().zip(results) {
            match result {
                Ok(ResyncAction::Published) => report.published += 1,
                Ok(ResyncAction::AlreadyCached) => report.skipped += 1,
                Ok(ResyncAction::Reingested(outcome)) => match outcome {
                    IngestOutcome::Cached(_) | IngestOutcome::Deduplicated(_) => {
                        report.reingested += 1;
                    }
                    IngestOutcome::Skipped(_) => report.skipped += 1,
                    IngestOutcome::Failed => report.failed += 1,
                },
                Err(error) => {
                    tracing::error!(%document_id, %error, "Failed to resync document");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            total = report.total,
            published = report.published,
            reingested = report.reingested,
            skipped = report.skipped,
            failed = report.failed,
            "Resync finished"
        );
        report
    }

    /// Background [`Self::resync`].
    pub fn spawn_resync(&self, document_ids: Vec<Uuid>) -> JoinHandle<ResyncReport> {
        let this = self.clone();
        self.tracker
            .spawn(async move { this.resync(&document_ids).await })
    }

    /// Resync every stored document, optionally for one owner.
    pub async fn warm(&self, owner_id: Option<Uuid>) -> IngestResult<ResyncReport> {
        let ids = self.documents.list_ids(owner_id).await?;
        Ok(self.resync(&ids).await)
    }

    /// Delete a document and its bytes.
    ///
    /// The cache entry is evicted only once no other record references the
    /// same content hash. An ingest of the same bytes can land between the
    /// reference count and the eviction, so the remaining records are checked
    /// again afterwards and the entry is restored from a stored vector.
    pub async fn remove_document(&self, document_id: Uuid) -> IngestResult<Option<DocumentRecord>> {
        let Some(record) = self.documents.delete(document_id).await? else {
            return Ok(None);
        };
        if !self.blobs.delete(&record.blob_key()).await? {
            tracing::warn!(%document_id, "Document had no stored bytes");
        }

        if let Some(hash) = &record.content_hash {
            let remaining = self.documents.count_by_content_hash(hash).await?;
            if remaining == 0 {
                let evicted = self.cache.delete(&hash.cache_key(self.cache_prefix())).await?;
                tracing::info!(%document_id, content_hash = %hash, evicted, "Evicted cache entry");
                self.restore_if_referenced(hash).await?;
            } else {
                tracing::debug!(%document_id, content_hash = %hash, remaining, "Cache entry still referenced");
            }
        }

        Ok(Some(record))
    }

    /// Wait for every spawned ingest and resync task.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Number of spawned tasks still running.
    pub fn pending_tasks(&self) -> usize {
        self.tracker.len()
    }

    async fn resync_one(&self, document_id: Uuid) -> IngestResult<ResyncAction> {
        let stored = self.documents.find(document_id).await?;
        let (hash, embedding, file_name) = match stored {
            Some(DocumentRecord {
                content_hash: Some(hash),
                embedding: Some(embedding),
                file_name,
                ..
            }) if !embedding.is_empty() => (hash, embedding, file_name),
            _ => {
                tracing::info!(%document_id, "Re-ingesting document without stored vector");
                return Ok(ResyncAction::Reingested(self.ingest(document_id).await));
            }
        };

        let _permit = self.budget.acquire_ingest().await?;
        let entry = CacheEntry::new(&embedding, file_name, None);
        if self.publish(&hash, entry).await? {
            Ok(ResyncAction::Published)
        } else {
            Ok(ResyncAction::AlreadyCached)
        }
    }

    /// Republish `hash` from the first record that still carries its vector.
    async fn restore_if_referenced(&self, hash: &ContentHash) -> IngestResult<()> {
        let survivor = self
            .documents
            .find_by_content_hash(hash, None)
            .await?
            .into_iter()
            .find_map(|doc| match doc.embedding {
                Some(embedding) if !embedding.is_empty() => Some((doc.file_name, embedding)),
                _ => None,
            });
        let Some((file_name, embedding)) = survivor else {
            return Ok(());
        };

        if self.publish(hash, CacheEntry::new(&embedding, file_name, None)).await? {
            tracing::info!(content_hash = %hash, "Restored cache entry still referenced after eviction");
        }
        Ok(())
    }

    /// Vector of an existing entry for `hash`, if it decodes.
    ///
    /// A corrupt entry is evicted so the caller re-encodes and republishes;
    /// any other cache failure falls through to a fresh encode.
    async fn cached_vector(&self, hash: &ContentHash) -> Option<Vec<f32>> {
        let key = hash.cache_key(self.cache_prefix());
        match self.cache.read(&key).await {
            Ok(entry) => entry.and_then(|entry| entry.vector()),
            Err(CacheError::Corrupt { key, reason }) => {
                tracing::warn!(%key, %reason, "Evicting corrupt cache entry");
                if let Err(error) = self.cache.delete(&key).await {
                    tracing::warn!(%key, %error, "Failed to evict corrupt cache entry");
                }
                None
            }
            Err(error) => {
                tracing::warn!(%key, %error, "Cache read failed, encoding anyway");
                None
            }
        }
    }

    /// Write the entry unless one exists. Returns whether this call wrote it.
    async fn publish(&self, hash: &ContentHash, entry: CacheEntry) -> IngestResult<bool> {
        let key = hash.cache_key(self.cache_prefix());
        if self.cache.exists(&key).await? {
            return Ok(false);
        }
        Ok(self.cache.write_if_absent(&key, entry).await?)
    }

    async fn extract(&self, record: &DocumentRecord, bytes: Vec<u8>) -> String {
        let kind = record.kind();
        let extractor = self.extractor;
        let result = tokio::task::spawn_blocking(move || extractor.extract(kind, &bytes)).await;

        match result {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                tracing::warn!(document_id = %record.id, %error, "Text extraction failed");
                String::new()
            }
            Err(error) => {
                tracing::error!(document_id = %record.id, %error, "Text extraction task panicked");
                String::new()
            }
        }
    }
}
