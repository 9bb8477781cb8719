//! Table output for CLI commands using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::SearchHit;
use crate::services::IngestOutcome;

/// One row of `ingest` output
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestRow {
    pub document_id: String,
    pub file_name: String,
    pub outcome: String,
}

impl IngestRow {
    pub fn new(document_id: uuid::Uuid, file_name: &str, outcome: &IngestOutcome) -> Self {
        Self {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            outcome: describe_outcome(outcome),
        }
    }
}

pub fn describe_outcome(outcome: &IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Cached(_) => "cached".to_string(),
        IngestOutcome::Deduplicated(_) => "deduplicated".to_string(),
        IngestOutcome::Skipped(reason) => format!("skipped ({reason:?})"),
        IngestOutcome::Failed => "failed".to_string(),
    }
}

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub const fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    pub fn format_hits(&self, hits: &[SearchHit]) -> String {
        let mut table = Self::create_base_table();
        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Document").add_attribute(Attribute::Bold),
            Cell::new("File").add_attribute(Attribute::Bold),
            Cell::new("Score").add_attribute(Attribute::Bold),
        ]);

        for (rank, hit) in hits.iter().enumerate() {
            let score = Cell::new(format!("{:.3}", hit.score));
            let score = if self.use_colors {
                score.fg(score_color(hit.score))
            } else {
                score
            };
            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(hit.document_id),
                Cell::new(truncate_text(&hit.file_name, 48)),
                score,
            ]);
        }
        table.to_string()
    }

    pub fn format_ingest(&self, rows: &[IngestRow]) -> String {
        let mut table = Self::create_base_table();
        table.set_header(vec![
            Cell::new("Document").add_attribute(Attribute::Bold),
            Cell::new("File").add_attribute(Attribute::Bold),
            Cell::new("Outcome").add_attribute(Attribute::Bold),
        ]);

        for row in rows {
            let outcome = Cell::new(&row.outcome);
            let outcome = if self.use_colors {
                outcome.fg(outcome_color(&row.outcome))
            } else {
                outcome
            };
            table.add_row(vec![
                Cell::new(&row.document_id),
                Cell::new(truncate_text(&row.file_name, 48)),
                outcome,
            ]);
        }
        table.to_string()
    }

    fn create_base_table() -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn score_color(score: f32) -> Color {
    if score >= 0.75 {
        Color::Green
    } else if score >= 0.25 {
        Color::Yellow
    } else {
        Color::DarkGrey
    }
}

fn outcome_color(outcome: &str) -> Color {
    match outcome {
        "cached" => Color::Green,
        "deduplicated" => Color::Cyan,
        "failed" => Color::Red,
        _ => Color::Yellow,
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
