//! Services: the encoder lifecycle, the concurrency budget and the ingestion
//! and search pipelines built on them.

pub mod concurrency_budget;
pub mod encoder_manager;
pub mod ingestion_service;
pub mod sampling;
pub mod scoring;
pub mod search_service;

pub use concurrency_budget::{split_budget, BudgetPermit, BudgetPool, ConcurrencyBudget};
pub use encoder_manager::{EncoderManager, EncoderSettings, EncoderState, ModelLease};
pub use ingestion_service::{
    IngestOutcome, IngestionService, IngestionSettings, ResyncReport, SkipReason,
};
pub use search_service::{normalize_query, SearchBackends, SearchService, SearchSettings};
