//! Application layer: wiring of adapters and services.

pub mod context;

pub use context::{model_loader, SearchContext};
