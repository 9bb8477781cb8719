//! Cache adapters
//!
//! moka-backed stores implementing the cache and primary vector ports.

pub mod moka_vector_cache;

pub use moka_vector_cache::MokaVectorCache;
