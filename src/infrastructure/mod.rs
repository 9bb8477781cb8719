//! Infrastructure layer: configuration, logging, text extraction and the
//! embedding model backends.

pub mod config;
pub mod extraction;
pub mod logging;
pub mod vector;
