//! CLI output formatting

pub mod table;

pub use table::{IngestRow, TableFormatter};
