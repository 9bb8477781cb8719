use anyhow::Result;
use uuid::Uuid;

use crate::application::SearchContext;

/// Handle `remove`.
pub async fn execute(ctx: &SearchContext, document_id: Uuid, json: bool) -> Result<()> {
    let removed = ctx.remove(document_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "document_id": document_id, "removed": removed.is_some() })
        );
        return Ok(());
    }

    match removed {
        Some(record) => println!("Removed {} ({})", record.file_name, record.id),
        None => println!("No document with id {document_id}"),
    }
    Ok(())
}
