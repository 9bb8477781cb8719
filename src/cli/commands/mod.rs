//! CLI command implementations.

pub mod ingest;
pub mod remove;
pub mod search;
