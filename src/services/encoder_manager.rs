//! Encoder resource manager
//!
//! Owns the in-memory embedding model and bounds its footprint:
//! - the model is loaded lazily on the first lease
//! - every encode runs under a lease; the live-lease count is tracked under a
//!   lock, and when it drops to zero an idle timer is armed
//! - a new lease before the timer fires disarms it; the timer is replaced,
//!   never stacked
//! - a memory pressure reading above threshold forces an unload/reload cycle
//! - out-of-memory while loading (or encoding) is retried once after an
//!   unload cycle, then reported as `ResourceExhausted`
//! - an admission semaphore caps CPU-bound encodes in flight
//!
//! Model loading and inference run on the blocking thread pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::domain::errors::EncoderError;
use crate::domain::models::EncoderConfig;
use crate::domain::ports::{EmbeddingModel, ModelLoader, PressureSignal};

/// Lifecycle state of the managed model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Unloaded,
    Loading,
    Ready,
}

impl std::fmt::Display for EncoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Tunables for [`EncoderManager`]
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub idle_timeout: Duration,
    pub max_concurrent_encodes: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            max_concurrent_encodes: 2,
        }
    }
}

impl From<&EncoderConfig> for EncoderSettings {
    fn from(config: &EncoderConfig) -> Self {
        Self {
            idle_timeout: Duration::from_secs(config.idle_unload_secs),
            max_concurrent_encodes: config.max_concurrent_encodes.max(1),
        }
    }
}

#[derive(Default)]
struct LeaseBook {
    active: usize,
    /// Bumped on every lease and on every arm of the idle timer. An armed
    /// timer only unloads if the epoch it captured is still current.
    epoch: u64,
    pending_unload: Option<AbortHandle>,
}

struct EncoderInner {
    loader: Arc<dyn ModelLoader>,
    pressure: Arc<dyn PressureSignal>,
    admission: Semaphore,
    slot: tokio::sync::Mutex<Option<Arc<dyn EmbeddingModel>>>,
    book: Mutex<LeaseBook>,
    idle_timeout: Duration,
    loading: AtomicBool,
    resident: AtomicBool,
    shut_down: AtomicBool,
    loads: AtomicU64,
    unloads: AtomicU64,
}

/// Shared handle to the embedding model. Cloning is cheap.
#[derive(Clone)]
pub struct EncoderManager {
    inner: Arc<EncoderInner>,
}

/// A live lease on the resident model. Dropping it releases the lease.
pub struct ModelLease {
    model: Arc<dyn EmbeddingModel>,
    _guard: LeaseGuard,
}

impl ModelLease {
    pub fn model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.model
    }
}

struct LeaseGuard {
    inner: Arc<EncoderInner>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.inner.release();
    }
}

struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl EncoderManager {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        pressure: Arc<dyn PressureSignal>,
        settings: EncoderSettings,
    ) -> Self {
        tracing::debug!(
            model = loader.model_name(),
            idle_timeout_ms = settings.idle_timeout.as_millis(),
            max_concurrent_encodes = settings.max_concurrent_encodes,
            "Encoder manager created"
        );
        Self {
            inner: Arc::new(EncoderInner {
                loader,
                pressure,
                admission: Semaphore::new(settings.max_concurrent_encodes.max(1)),
                slot: tokio::sync::Mutex::new(None),
                book: Mutex::new(LeaseBook::default()),
                idle_timeout: settings.idle_timeout,
                loading: AtomicBool::new(false),
                resident: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                loads: AtomicU64::new(0),
                unloads: AtomicU64::new(0),
            }),
        }
    }

    /// Encode `texts` into vectors of [`Self::dimensions`] width.
    ///
    /// All-or-nothing: either every input gets a vector or the call fails.
    pub async fn embed(
        &self,
        texts: &[String],
        normalize: bool,
    ) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Err(EncoderError::EmptyInput);
        }

        let _admission = self
            .inner
            .admission
            .acquire()
            .await
            .map_err(|_| EncoderError::ShuttingDown)?;

        if self.inner.pressure.is_under_pressure() {
            self.inner.reclaim().await;
        }

        let lease = self.acquire_lease().await?;
        let inputs = texts.to_vec();

        let vectors = match self.inner.encode_on(lease.model(), inputs.clone(), normalize).await {
            Err(EncoderError::OutOfMemory(reason)) => {
                tracing::warn!(reason = %reason, "Out of memory while encoding, reloading model");
                let model = self.inner.force_reload().await?;
                match self.inner.encode_on(&model, inputs, normalize).await {
                    Err(EncoderError::OutOfMemory(reason)) => {
                        return Err(EncoderError::ResourceExhausted(reason))
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        self.validate(texts.len(), vectors)
    }

    /// Take a lease, loading the model if needed.
    pub async fn acquire_lease(&self) -> Result<ModelLease, EncoderError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(EncoderError::ShuttingDown);
        }
        self.inner.open_lease();
        let guard = LeaseGuard {
            inner: Arc::clone(&self.inner),
        };
        let model = self.inner.ensure_loaded().await?;
        Ok(ModelLease {
            model,
            _guard: guard,
        })
    }

    fn validate(
        &self,
        expected_count: usize,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, EncoderError> {
        if vectors.len() != expected_count {
            return Err(EncoderError::EncodingFailed(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                expected_count
            )));
        }
        let expected = self.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EncoderError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    /// Drop the resident model now. In-flight leases keep their handle until
    /// they finish. Returns whether a model was resident.
    pub async fn evict(&self) -> bool {
        let mut slot = self.inner.slot.lock().await;
        let evicted = self.inner.take_model(&mut slot);
        if evicted {
            tracing::info!(model = self.inner.loader.model_name(), "Encoder evicted");
        }
        evicted
    }

    /// Refuse new work, disarm the idle timer and drop the model.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.admission.close();
        if let Some(pending) = self.inner.book().pending_unload.take() {
            pending.abort();
        }
        let mut slot = self.inner.slot.lock().await;
        self.inner.take_model(&mut slot);
        tracing::info!(model = self.inner.loader.model_name(), "Encoder shut down");
    }

    pub fn state(&self) -> EncoderState {
        if self.inner.loading.load(Ordering::SeqCst) {
            EncoderState::Loading
        } else if self.inner.resident.load(Ordering::SeqCst) {
            EncoderState::Ready
        } else {
            EncoderState::Unloaded
        }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.loader.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.inner.loader.model_name()
    }

    pub fn active_leases(&self) -> usize {
        self.inner.book().active
    }

    /// Successful model loads since creation.
    pub fn load_count(&self) -> u64 {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Model unloads (idle, pressure, eviction, OOM) since creation.
    pub fn unload_count(&self) -> u64 {
        self.inner.unloads.load(Ordering::SeqCst)
    }

    /// Encode permits currently free.
    pub fn available_encode_slots(&self) -> usize {
        self.inner.admission.available_permits()
    }
}

impl EncoderInner {
    fn book(&self) -> MutexGuard<'_, LeaseBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_lease(&self) {
        let mut book = self.book();
        book.active += 1;
        book.epoch = book.epoch.wrapping_add(1);
        if let Some(pending) = book.pending_unload.take() {
            pending.abort();
        }
    }

    fn release(self: &Arc<Self>) {
        let mut book = self.book();
        book.active = book.active.saturating_sub(1);
        if book.active > 0 || self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        book.epoch = book.epoch.wrapping_add(1);
        let epoch = book.epoch;
        if let Some(pending) = book.pending_unload.take() {
            pending.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, idle unload not scheduled");
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let idle = self.idle_timeout;
        let task = runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            if let Some(inner) = weak.upgrade() {
                inner.unload_if_idle(epoch).await;
            }
        });
        book.pending_unload = Some(task.abort_handle());
    }

    async fn unload_if_idle(&self, epoch: u64) {
        let mut slot = self.slot.lock().await;
        {
            let mut book = self.book();
            if book.active != 0 || book.epoch != epoch {
                return;
            }
            book.pending_unload = None;
        }
        if self.take_model(&mut slot) {
            tracing::info!(
                model = self.loader.model_name(),
                idle_ms = self.idle_timeout.as_millis(),
                "Encoder unloaded after idle timeout"
            );
        }
    }

    fn take_model(&self, slot: &mut Option<Arc<dyn EmbeddingModel>>) -> bool {
        if slot.take().is_some() {
            self.resident.store(false, Ordering::SeqCst);
            self.unloads.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn ensure_loaded(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        let mut slot = self.slot.lock().await;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = self.load_with_retry().await?;
        *slot = Some(Arc::clone(&model));
        self.resident.store(true, Ordering::SeqCst);
        Ok(model)
    }

    /// Unload whatever is resident and load a fresh instance.
    async fn force_reload(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        let mut slot = self.slot.lock().await;
        self.take_model(&mut slot);
        let model = self.load_with_retry().await?;
        *slot = Some(Arc::clone(&model));
        self.resident.store(true, Ordering::SeqCst);
        Ok(model)
    }

    /// Pressure response. Never fails the caller.
    async fn reclaim(&self) {
        if !self.resident.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(
            usage_mb = ?self.pressure.usage_mb(),
            model = self.loader.model_name(),
            "Memory pressure, cycling encoder"
        );
        if let Err(e) = self.force_reload().await {
            tracing::warn!(error = %e, "Encoder reload after memory pressure failed");
        }
    }

    async fn load_with_retry(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        match self.load_once().await {
            Err(EncoderError::OutOfMemory(reason)) => {
                tracing::warn!(
                    model = self.loader.model_name(),
                    reason = %reason,
                    "Out of memory loading encoder, retrying once"
                );
                tokio::task::yield_now().await;
                match self.load_once().await {
                    Err(EncoderError::OutOfMemory(reason)) => {
                        Err(EncoderError::ResourceExhausted(reason))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn load_once(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        let _flag = LoadingFlag::raise(&self.loading);
        let started = Instant::now();
        let loader = Arc::clone(&self.loader);

        let model = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| EncoderError::ModelLoad {
                model_name: self.loader.model_name().to_string(),
                reason: e.to_string(),
            })??;

        let expected = self.loader.dimensions();
        if model.dimensions() != expected {
            return Err(EncoderError::DimensionMismatch {
                expected,
                actual: model.dimensions(),
            });
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            model = self.loader.model_name(),
            dimensions = expected,
            elapsed_ms = started.elapsed().as_millis(),
            "Encoder loaded"
        );
        Ok(model)
    }

    async fn encode_on(
        &self,
        model: &Arc<dyn EmbeddingModel>,
        texts: Vec<String>,
        normalize: bool,
    ) -> Result<Vec<Vec<f32>>, EncoderError> {
        let model = Arc::clone(model);
        let count = texts.len();
        let started = Instant::now();
        let vectors = tokio::task::spawn_blocking(move || model.encode(&texts, normalize))
            .await
            .map_err(|e| EncoderError::EncodingFailed(e.to_string()))??;
        tracing::debug!(
            inputs = count,
            elapsed_ms = started.elapsed().as_millis(),
            "Encoded batch"
        );
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NoPressure;
    use crate::infrastructure::vector::HashingModelLoader;

    fn manager(idle: Duration) -> EncoderManager {
        EncoderManager::new(
            Arc::new(HashingModelLoader::new(16)),
            Arc::new(NoPressure),
            EncoderSettings {
                idle_timeout: idle,
                max_concurrent_encodes: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_lazy_load() {
        let encoder = manager(Duration::from_secs(30));
        assert_eq!(encoder.state(), EncoderState::Unloaded);
        assert_eq!(encoder.load_count(), 0);

        let out = encoder.embed(&["hello".to_string()], true).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 16);
        assert_eq!(encoder.state(), EncoderState::Ready);
        assert_eq!(encoder.load_count(), 1);
        assert_eq!(encoder.active_leases(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let encoder = manager(Duration::from_secs(30));
        assert_eq!(encoder.embed(&[], true).await.unwrap_err(), EncoderError::EmptyInput);
        assert_eq!(encoder.load_count(), 0);
    }

    #[tokio::test]
    async fn test_model_reused_across_calls() {
        let encoder = manager(Duration::from_secs(30));
        for _ in 0..3 {
            encoder.embed(&["x".to_string()], false).await.unwrap();
        }
        assert_eq!(encoder.load_count(), 1);
    }

    #[tokio::test]
    async fn test_lease_counting() {
        let encoder = manager(Duration::from_secs(30));
        let a = encoder.acquire_lease().await.unwrap();
        let b = encoder.acquire_lease().await.unwrap();
        assert_eq!(encoder.active_leases(), 2);
        drop(a);
        assert_eq!(encoder.active_leases(), 1);
        drop(b);
        assert_eq!(encoder.active_leases(), 0);
    }

    #[tokio::test]
    async fn test_evict_and_reload() {
        let encoder = manager(Duration::from_secs(30));
        encoder.embed(&["x".to_string()], true).await.unwrap();
        assert!(encoder.evict().await);
        assert_eq!(encoder.state(), EncoderState::Unloaded);
        assert!(!encoder.evict().await);

        encoder.embed(&["y".to_string()], true).await.unwrap();
        assert_eq!(encoder.load_count(), 2);
        assert_eq!(encoder.unload_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_work() {
        let encoder = manager(Duration::from_secs(30));
        encoder.embed(&["x".to_string()], true).await.unwrap();
        encoder.shutdown().await;
        assert_eq!(encoder.state(), EncoderState::Unloaded);
        assert_eq!(
            encoder.embed(&["x".to_string()], true).await.unwrap_err(),
            EncoderError::ShuttingDown
        );
    }

    #[tokio::test]
    async fn test_idle_unload() {
        let encoder = manager(Duration::from_millis(50));
        encoder.embed(&["x".to_string()], true).await.unwrap();
        assert_eq!(encoder.state(), EncoderState::Ready);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(encoder.state(), EncoderState::Unloaded);
        assert_eq!(encoder.unload_count(), 1);
    }
}
