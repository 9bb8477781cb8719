//! Composition root.
//!
//! `SearchContext` builds every adapter and service from a [`Config`] and
//! owns them for the life of the process. There are no globals: callers
//! hold the context, and [`SearchContext::shutdown`] tears it down.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::cache::MokaVectorCache;
use crate::adapters::sqlite::{
    create_migrated_test_pool, database_url, initialize_database, PoolConfig, SqliteBlobStore,
    SqliteDocumentRepository,
};
use crate::domain::models::{
    Config, DistanceMetric, DocumentRecord, EmbeddingModelKind, IndexSpec, SearchResponse,
    SearchScope,
};
use crate::domain::errors::SearchError;
use crate::domain::ports::{
    BlobStore, DocumentStore, ModelLoader, NoPressure, PressureSignal, PrimaryVectorBackend,
};
use crate::infrastructure::vector::{HashingModelLoader, ProcessMemoryPressure};
use crate::services::{
    ConcurrencyBudget, EncoderManager, EncoderSettings, IngestOutcome, IngestionService,
    IngestionSettings, ResyncReport, SearchBackends, SearchService, SearchSettings,
};

/// Pick the model loader for the configured backend.
pub fn model_loader(kind: EmbeddingModelKind) -> Result<Arc<dyn ModelLoader>> {
    match kind {
        EmbeddingModelKind::Hashing => Ok(Arc::new(HashingModelLoader::new(kind.dimensions()))),
        #[cfg(feature = "bert")]
        EmbeddingModelKind::LocalMiniLM | EmbeddingModelKind::LocalMPNet => Ok(Arc::new(
            crate::infrastructure::vector::BertModelLoader::new(kind),
        )),
        #[cfg(not(feature = "bert"))]
        other => anyhow::bail!("Embedding model {other} requires building with the `bert` feature"),
    }
}

fn pressure_signal(threshold_mb: Option<u64>) -> Arc<dyn PressureSignal> {
    match threshold_mb {
        Some(mb) => Arc::new(ProcessMemoryPressure::new(mb)),
        None => Arc::new(NoPressure),
    }
}

/// Every long-lived component of the search core
pub struct SearchContext {
    config: Config,
    pool: SqlitePool,
    documents: Arc<SqliteDocumentRepository>,
    blobs: Arc<SqliteBlobStore>,
    cache: Arc<MokaVectorCache>,
    encoder: EncoderManager,
    budget: ConcurrencyBudget,
    ingestion: IngestionService,
    search: SearchService,
}

impl SearchContext {
    /// Open the configured database, run migrations and wire the services.
    pub async fn from_config(config: Config) -> Result<Self> {
        let url = database_url(&config.database.path);
        let pool = initialize_database(&url, Some(PoolConfig::from(&config.database)))
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        let loader = model_loader(config.encoder.model)?;
        Self::assemble(config, pool, loader).await
    }

    /// Same wiring over a fresh in-memory database.
    pub async fn in_memory(config: Config, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        let pool = create_migrated_test_pool()
            .await
            .context("Failed to create in-memory database")?;
        Self::assemble(config, pool, loader).await
    }

    async fn assemble(config: Config, pool: SqlitePool, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        let documents = Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let blobs = Arc::new(SqliteBlobStore::new(pool.clone()));
        let cache = Arc::new(MokaVectorCache::from_config(&config.cache));

        let index = IndexSpec {
            name: config.search.index_name.clone(),
            prefix: config.cache.prefix.clone(),
            dimensions: loader.dimensions(),
            metric: DistanceMetric::L2,
        };
        cache
            .ensure_index(&index)
            .await
            .context("Failed to create primary vector index")?;

        let encoder = EncoderManager::new(
            loader,
            pressure_signal(config.encoder.memory_threshold_mb),
            EncoderSettings::from(&config.encoder),
        );
        let budget = ConcurrencyBudget::from_config(&config.budget)
            .context("Invalid concurrency budget")?;

        let ingestion = IngestionService::new(
            documents.clone(),
            blobs.clone(),
            cache.clone(),
            encoder.clone(),
            budget.clone(),
            IngestionSettings {
                sampling: config.sampling.clone(),
                cache_prefix: config.cache.prefix.clone(),
                normalize: config.encoder.normalize_embeddings,
            },
        );
        let search = SearchService::new(
            SearchBackends {
                primary: cache.clone(),
                cache: cache.clone(),
                secondary: documents.clone(),
                documents: documents.clone(),
            },
            encoder.clone(),
            budget.clone(),
            ingestion.clone(),
            SearchSettings::from_config(&config.search, config.cache.prefix.clone()),
        );

        tracing::info!(
            model = encoder.model_name(),
            dimensions = encoder.dimensions(),
            ingest_permits = budget.ingest_limit(),
            search_permits = budget.search_limit(),
            "Search context ready"
        );

        Ok(Self {
            config,
            pool,
            documents,
            blobs,
            cache,
            encoder,
            budget,
            ingestion,
            search,
        })
    }

    /// Store a new document and schedule its ingestion.
    pub async fn upload(&self, owner_id: Uuid, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<DocumentRecord> {
        let record = self.store(owner_id, file_name, mime_type, bytes).await?;
        let _handle = self.ingestion.spawn_ingest(record.id);
        Ok(record)
    }

    /// Store a new document and ingest it before returning.
    pub async fn upload_and_ingest(
        &self,
        owner_id: Uuid,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<(DocumentRecord, IngestOutcome)> {
        let record = self.store(owner_id, file_name, mime_type, bytes).await?;
        let outcome = self.ingestion.ingest(record.id).await;
        Ok((record, outcome))
    }

    async fn store(&self, owner_id: Uuid, file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<DocumentRecord> {
        let record = DocumentRecord::new(owner_id, file_name, mime_type, bytes.len() as u64);
        self.documents
            .insert(&record)
            .await
            .with_context(|| format!("Failed to store metadata for {file_name}"))?;
        self.blobs
            .put(&record.blob_key(), bytes)
            .await
            .with_context(|| format!("Failed to store bytes for {file_name}"))?;
        Ok(record)
    }

    pub async fn search(&self, query: &str, owner_id: Uuid) -> Result<SearchResponse, SearchError> {
        self.search.search(query, SearchScope::owner(owner_id)).await
    }

    /// Delete a document, evicting its cache entry once unreferenced.
    pub async fn remove(&self, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        self.ingestion
            .remove_document(document_id)
            .await
            .with_context(|| format!("Failed to remove document {document_id}"))
    }

    /// Repopulate the in-process primary index from stored vectors.
    pub async fn warm_primary(&self, owner_id: Option<Uuid>) -> Result<ResyncReport> {
        self.ingestion
            .warm(owner_id)
            .await
            .context("Failed to list documents for warm-up")
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn search_service(&self) -> &SearchService {
        &self.search
    }

    pub fn encoder(&self) -> &EncoderManager {
        &self.encoder
    }

    pub fn cache(&self) -> &Arc<MokaVectorCache> {
        &self.cache
    }

    pub fn documents(&self) -> &Arc<SqliteDocumentRepository> {
        &self.documents
    }

    /// Finish background work, unload the model and close the database.
    pub async fn shutdown(&self) {
        self.ingestion.drain().await;
        self.budget.close();
        self.encoder.shutdown().await;
        self.pool.close().await;
        tracing::info!("Search context shut down");
    }
}
