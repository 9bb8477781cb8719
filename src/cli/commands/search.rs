use anyhow::{Context, Result};
use uuid::Uuid;

use crate::application::SearchContext;
use crate::cli::output::TableFormatter;

/// Handle `search`.
///
/// The primary index lives in process memory, so the owner's stored vectors
/// are republished into it before querying.
pub async fn execute(ctx: &SearchContext, owner: Uuid, query: &[String], json: bool) -> Result<()> {
    let report = ctx.warm_primary(Some(owner)).await?;
    tracing::debug!(published = report.published, "Primary index warmed");

    let query = query.join(" ");
    let response = ctx
        .search(&query, owner)
        .await
        .with_context(|| format!("Search for '{query}' failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if response.hits.is_empty() {
        println!("No matching documents.");
    } else {
        println!("{}", TableFormatter::new().format_hits(&response.hits));
        println!("\n{} result(s) from the {} index", response.hits.len(), response.source);
    }
    Ok(())
}
