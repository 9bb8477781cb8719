//! Common test utilities for integration tests
//!
//! Scripted fakes for the model, pressure and backend ports, plus a harness
//! that wires the real services over an in-memory database.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use vaultsearch::adapters::cache::MokaVectorCache;
use vaultsearch::adapters::sqlite::{SqliteBlobStore, SqliteDocumentRepository};
use vaultsearch::domain::errors::{BackendError, CacheError, EncoderError};
use vaultsearch::domain::models::{
    CacheEntry, DistanceMetric, DocumentRecord, IndexSpec, KnnMatch, ScoredDocument,
    VectorSearchQuery,
};
use vaultsearch::domain::ports::{
    BlobStore, CacheStore, DocumentStore, EmbeddingModel, ModelLoader, NoPressure, PressureSignal,
    PrimaryVectorBackend, SecondaryVectorBackend,
};
use vaultsearch::infrastructure::vector::HashingEmbeddingModel;
use vaultsearch::services::{
    ConcurrencyBudget, EncoderManager, EncoderSettings, IngestionService, IngestionSettings,
    SearchBackends, SearchService, SearchSettings,
};

pub const DIM: usize = 64;

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Counters shared between a [`ScriptedLoader`] and the models it hands out
#[derive(Default)]
pub struct LoaderStats {
    pub load_attempts: AtomicUsize,
    pub encodes: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_batch: AtomicUsize,
    load_ooms: AtomicUsize,
    encode_ooms: AtomicUsize,
}

impl LoaderStats {
    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_batch(&self) -> usize {
        self.last_batch.load(Ordering::SeqCst)
    }
}

/// Model loader wrapping the hashing model with scripted failures and an
/// optional per-encode delay.
pub struct ScriptedLoader {
    dimensions: usize,
    encode_delay: Duration,
    stats: Arc<LoaderStats>,
}

impl ScriptedLoader {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            encode_delay: Duration::ZERO,
            stats: Arc::new(LoaderStats::default()),
        }
    }

    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = delay;
        self
    }

    /// The next `n` loads fail with out-of-memory.
    pub fn fail_loads(self, n: usize) -> Self {
        self.stats.load_ooms.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` encodes fail with out-of-memory.
    pub fn fail_encodes(self, n: usize) -> Self {
        self.stats.encode_ooms.store(n, Ordering::SeqCst);
        self
    }

    pub fn stats(&self) -> Arc<LoaderStats> {
        Arc::clone(&self.stats)
    }
}

impl ModelLoader for ScriptedLoader {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        self.stats.load_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.stats.load_ooms) {
            return Err(EncoderError::OutOfMemory("scripted load failure".to_string()));
        }
        Ok(Arc::new(ScriptedModel {
            inner: HashingEmbeddingModel::new(self.dimensions),
            delay: self.encode_delay,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedModel {
    inner: HashingEmbeddingModel,
    delay: Duration,
    stats: Arc<LoaderStats>,
}

impl EmbeddingModel for ScriptedModel {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EncoderError> {
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.stats.encodes.fetch_add(1, Ordering::SeqCst);
        self.stats.last_batch.store(texts.len(), Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = if take_one(&self.stats.encode_ooms) {
            Err(EncoderError::OutOfMemory("scripted encode failure".to_string()))
        } else {
            self.inner.encode(texts, normalize)
        };

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Pressure signal that reports pressure for the next `n` readings.
#[derive(Default)]
pub struct ScriptedPressure {
    pending: AtomicUsize,
    readings: AtomicUsize,
}

impl ScriptedPressure {
    pub fn fire(&self, n: usize) {
        self.pending.store(n, Ordering::SeqCst);
    }

    pub fn readings(&self) -> usize {
        self.readings.load(Ordering::SeqCst)
    }
}

impl PressureSignal for ScriptedPressure {
    fn is_under_pressure(&self) -> bool {
        self.readings.fetch_add(1, Ordering::SeqCst);
        take_one(&self.pending)
    }

    fn usage_mb(&self) -> Option<u64> {
        Some(4096)
    }
}

/// Primary backend whose queries always fail as if the connection dropped
#[derive(Default)]
pub struct UnreachablePrimary {
    pub queries: AtomicUsize,
}

#[async_trait]
impl PrimaryVectorBackend for UnreachablePrimary {
    async fn ensure_index(&self, _spec: &IndexSpec) -> Result<(), BackendError> {
        Ok(())
    }

    async fn knn(&self, _vector: &[f32], _k: usize) -> Result<Vec<KnnMatch>, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("connection refused".to_string()))
    }
}

/// Secondary backend that always fails
#[derive(Default)]
pub struct UnreachableSecondary;

#[async_trait]
impl SecondaryVectorBackend for UnreachableSecondary {
    async fn vector_search(
        &self,
        _query: &VectorSearchQuery,
    ) -> Result<Vec<ScoredDocument>, BackendError> {
        Err(BackendError::Unavailable("cluster offline".to_string()))
    }
}

/// Cache that serves reads and writes from an inner cache but whose
/// recency refresh always fails
pub struct UntouchableCache {
    inner: Arc<MokaVectorCache>,
    touches: Arc<AtomicUsize>,
}

impl UntouchableCache {
    pub fn new(inner: Arc<MokaVectorCache>, touches: Arc<AtomicUsize>) -> Self {
        Self { inner, touches }
    }
}

#[async_trait]
impl CacheStore for UntouchableCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    async fn write_if_absent(&self, key: &str, entry: CacheEntry) -> Result<bool, CacheError> {
        self.inner.write_if_absent(key, entry).await
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.read(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }

    async fn touch(&self, _keys: &[String]) -> Result<(), CacheError> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection reset by peer".to_string()))
    }
}

pub fn index_spec(dimensions: usize) -> IndexSpec {
    IndexSpec {
        name: "doc_index".to_string(),
        prefix: "doc:".to_string(),
        dimensions,
        metric: DistanceMetric::L2,
    }
}

pub fn encoder_with(
    loader: Arc<dyn ModelLoader>,
    pressure: Arc<dyn PressureSignal>,
    idle_timeout: Duration,
) -> EncoderManager {
    EncoderManager::new(
        loader,
        pressure,
        EncoderSettings {
            idle_timeout,
            max_concurrent_encodes: 2,
        },
    )
}

/// Real services over an in-memory database
pub struct Harness {
    pub documents: Arc<SqliteDocumentRepository>,
    pub blobs: Arc<SqliteBlobStore>,
    pub cache: Arc<MokaVectorCache>,
    pub encoder: EncoderManager,
    pub ingestion: IngestionService,
    pub search: SearchService,
}

pub struct HarnessBuilder {
    loader: Arc<dyn ModelLoader>,
    primary: Option<Arc<dyn PrimaryVectorBackend>>,
    secondary: Option<Arc<dyn SecondaryVectorBackend>>,
    search_cache: Option<Box<dyn FnOnce(Arc<MokaVectorCache>) -> Arc<dyn CacheStore>>>,
}

impl HarnessBuilder {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            primary: None,
            secondary: None,
            search_cache: None,
        }
    }

    pub fn primary(mut self, primary: Arc<dyn PrimaryVectorBackend>) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn secondary(mut self, secondary: Arc<dyn SecondaryVectorBackend>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Wrap the harness cache before handing it to search.
    pub fn search_cache(
        mut self,
        wrap: impl FnOnce(Arc<MokaVectorCache>) -> Arc<dyn CacheStore> + 'static,
    ) -> Self {
        self.search_cache = Some(Box::new(wrap));
        self
    }

    pub async fn build(self, pool: SqlitePool) -> Harness {
        let documents = Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let blobs = Arc::new(SqliteBlobStore::new(pool));
        let cache = Arc::new(MokaVectorCache::new(10_000, Duration::from_secs(3600)));
        cache
            .ensure_index(&index_spec(self.loader.dimensions()))
            .await
            .expect("index");

        let encoder = encoder_with(self.loader, Arc::new(NoPressure), Duration::from_secs(30));
        let budget = ConcurrencyBudget::new(8, 0.75).expect("budget");
        let ingestion = IngestionService::new(
            documents.clone(),
            blobs.clone(),
            cache.clone(),
            encoder.clone(),
            budget.clone(),
            IngestionSettings::default(),
        );

        let primary: Arc<dyn PrimaryVectorBackend> = match self.primary {
            Some(primary) => primary,
            None => cache.clone(),
        };
        let secondary: Arc<dyn SecondaryVectorBackend> = match self.secondary {
            Some(secondary) => secondary,
            None => documents.clone(),
        };
        let search_cache: Arc<dyn CacheStore> = match self.search_cache {
            Some(wrap) => wrap(cache.clone()),
            None => cache.clone(),
        };
        let search = SearchService::new(
            SearchBackends {
                primary,
                cache: search_cache,
                secondary,
                documents: documents.clone(),
            },
            encoder.clone(),
            budget,
            ingestion.clone(),
            SearchSettings::default(),
        );

        Harness {
            documents,
            blobs,
            cache,
            encoder,
            ingestion,
            search,
        }
    }
}

impl Harness {
    /// Store a document the way the upload collaborator would.
    pub async fn upload(&self, owner: Uuid, name: &str, mime: &str, bytes: &[u8]) -> Uuid {
        let record = DocumentRecord::new(owner, name, mime, bytes.len() as u64);
        self.documents.insert(&record).await.expect("insert");
        self.blobs
            .put(&record.blob_key(), bytes)
            .await
            .expect("put blob");
        record.id
    }
}
