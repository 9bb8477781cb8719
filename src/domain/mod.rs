//! Domain layer for the vaultsearch core
//!
//! Models, errors and the port traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    BackendError, BudgetError, CacheError, DomainError, DomainResult, EncoderError, IngestError,
    SearchError,
};
