use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::application::SearchContext;
use crate::cli::output::{IngestRow, TableFormatter};
use crate::domain::models::DocumentKind;

/// Handle `ingest`: store each file, then run the ingestion pipeline on it.
pub async fn execute(ctx: &SearchContext, owner: Uuid, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let mut rows = Vec::with_capacity(paths.len());

    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (file_name, mime_type) = describe_file(path);

        let (record, outcome) = ctx
            .upload_and_ingest(owner, &file_name, mime_type, &bytes)
            .await?;
        rows.push(IngestRow::new(record.id, &file_name, &outcome));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", TableFormatter::new().format_ingest(&rows));
        println!("\nIngested {} file{}", rows.len(), if rows.len() == 1 { "" } else { "s" });
    }
    Ok(())
}

fn describe_file(path: &Path) -> (String, &'static str) {
    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mime_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or("application/octet-stream", DocumentKind::mime_for_extension);
    (file_name, mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_file() {
        assert_eq!(
            describe_file(Path::new("/tmp/q3/Report.PDF")),
            ("Report.PDF".to_string(), "application/pdf")
        );
        assert_eq!(
            describe_file(Path::new("notes")),
            ("notes".to_string(), "application/octet-stream")
        );
    }
}
