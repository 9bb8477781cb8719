//! vaultsearch CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use vaultsearch::application::SearchContext;
use vaultsearch::cli::{Cli, Commands};
use vaultsearch::infrastructure::config::ConfigLoader;
use vaultsearch::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        vaultsearch::cli::handle_error(&err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    let ctx = SearchContext::from_config(config).await?;

    let result = match cli.command {
        Commands::Ingest { owner, paths } => {
            vaultsearch::cli::commands::ingest::execute(&ctx, owner, paths, cli.json).await
        }
        Commands::Search { owner, query } => {
            vaultsearch::cli::commands::search::execute(&ctx, owner, &query, cli.json).await
        }
        Commands::Remove { document_id } => {
            vaultsearch::cli::commands::remove::execute(&ctx, document_id, cli.json).await
        }
    };

    ctx.shutdown().await;
    result
}
