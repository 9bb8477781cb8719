use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vaultsearch")]
#[command(about = "Semantic document search with a cached vector index", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .vaultsearch/config.yaml)
    #[arg(short, long, global = true, env = "VAULTSEARCH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store and ingest documents for an owner
    Ingest {
        /// Owner of the documents
        #[arg(short, long)]
        owner: Uuid,

        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Search an owner's documents
    Search {
        /// Owner whose documents are searched
        #[arg(short, long)]
        owner: Uuid,

        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Delete a document
    Remove {
        /// Document id as printed by `ingest`
        document_id: Uuid,
    },
}
