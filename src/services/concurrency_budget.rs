//! Concurrency budget split between ingestion and search.
//!
//! One configured total is partitioned into two disjoint semaphores. A full
//! ingest pool never delays a search permit.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::errors::BudgetError;
use crate::domain::models::BudgetConfig;

/// Split `total` into `(ingest, search)`.
///
/// `ingest = floor(total * ratio)` and search receives the remainder, so the
/// two always sum to `total`.
///
/// A total and ratio that would leave either pool empty, such as `total = 1`,
/// are rejected with [`BudgetError::InvalidSplit`] instead of producing a
/// pool with zero permits.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn split_budget(total: usize, ratio: f64) -> Result<(usize, usize), BudgetError> {
    if !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0) {
        return Err(BudgetError::InvalidSplit { total, ratio });
    }
    let ingest = (total as f64 * ratio).floor() as usize;
    let search = total - ingest.min(total);
    if ingest == 0 || search == 0 {
        return Err(BudgetError::InvalidSplit { total, ratio });
    }
    Ok((ingest, search))
}

/// Which side of the budget a permit was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPool {
    Ingest,
    Search,
}

impl BudgetPool {
    const fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Search => "search",
        }
    }
}

/// Scoped admission into one pool. Dropping it returns the permit.
#[derive(Debug)]
pub struct BudgetPermit {
    pool: BudgetPool,
    _permit: OwnedSemaphorePermit,
}

impl BudgetPermit {
    pub const fn pool(&self) -> BudgetPool {
        self.pool
    }
}

/// Two independent admission gates derived from one total
#[derive(Debug, Clone)]
pub struct ConcurrencyBudget {
    ingest: Arc<Semaphore>,
    search: Arc<Semaphore>,
    ingest_limit: usize,
    search_limit: usize,
}

impl ConcurrencyBudget {
    pub fn new(total: usize, ingest_ratio: f64) -> Result<Self, BudgetError> {
        let (ingest_limit, search_limit) = split_budget(total, ingest_ratio)?;
        tracing::debug!(total, ingest_limit, search_limit, "Concurrency budget split");
        Ok(Self {
            ingest: Arc::new(Semaphore::new(ingest_limit)),
            search: Arc::new(Semaphore::new(search_limit)),
            ingest_limit,
            search_limit,
        })
    }

    pub fn from_config(config: &BudgetConfig) -> Result<Self, BudgetError> {
        Self::new(config.total_concurrency, config.ingest_ratio)
    }

    /// Wait for an ingestion permit.
    pub async fn acquire_ingest(&self) -> Result<BudgetPermit, BudgetError> {
        Self::acquire(&self.ingest, BudgetPool::Ingest).await
    }

    /// Wait for a search permit.
    pub async fn acquire_search(&self) -> Result<BudgetPermit, BudgetError> {
        Self::acquire(&self.search, BudgetPool::Search).await
    }

    async fn acquire(
        semaphore: &Arc<Semaphore>,
        pool: BudgetPool,
    ) -> Result<BudgetPermit, BudgetError> {
        let permit = Arc::clone(semaphore)
            .acquire_owned()
            .await
            .map_err(|_| BudgetError::Closed(pool.name()))?;
        Ok(BudgetPermit {
            pool,
            _permit: permit,
        })
    }

    pub const fn ingest_limit(&self) -> usize {
        self.ingest_limit
    }

    pub const fn search_limit(&self) -> usize {
        self.search_limit
    }

    pub fn ingest_available(&self) -> usize {
        self.ingest.available_permits()
    }

    pub fn search_available(&self) -> usize {
        self.search.available_permits()
    }

    /// Refuse all future acquisitions. Waiters are woken with an error.
    pub fn close(&self) {
        self.ingest.close();
        self.search.close();
    }
}
