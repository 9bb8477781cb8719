//! vaultsearch - embedding lifecycle and dual-backend semantic search
//!
//! Documents are embedded once per unique content hash and published into a
//! fast primary vector cache. Queries go to that cache first and fall back to
//! an ownership-scoped search over the stored vectors when it fails.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): moka vector cache, SQLite metadata and blobs
//! - **Service Layer** (`services`): encoder lifecycle, concurrency budget,
//!   ingestion and search pipelines
//! - **Infrastructure Layer** (`infrastructure`): config, logging, text
//!   extraction, embedding models
//! - **Application Layer** (`application`): `SearchContext` wiring
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use vaultsearch::{ConfigLoader, SearchContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = SearchContext::from_config(ConfigLoader::load()?).await?;
//!     let hits = ctx.search("quarterly report", owner_id).await?;
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::SearchContext;
pub use domain::errors::{EncoderError, IngestError, SearchError};
pub use domain::models::{Config, DocumentRecord, SearchHit, SearchResponse, SearchScope};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EncoderManager, IngestOutcome, IngestionService, SearchService};
