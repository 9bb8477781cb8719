//! Document metadata records and content addressing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowercase hex SHA-256 of a document's raw bytes.
///
/// This is the caching identity of a document: two uploads with identical
/// bytes share one cache entry regardless of their storage ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash raw document bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{digest:x}"))
    }

    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key for this hash under `prefix`.
    pub fn cache_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }

    /// Recover a hash from a cache key. Returns `None` for foreign keys.
    pub fn from_cache_key(key: &str, prefix: &str) -> Option<Self> {
        key.strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
            .map(|rest| Self(rest.to_string()))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text extraction strategy selected by MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    PlainText,
    Markdown,
    Csv,
    Unsupported,
}

impl DocumentKind {
    /// Classify a MIME type. Parameters such as `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "text/plain" => Self::PlainText,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/csv" | "application/csv" => Self::Csv,
            _ => Self::Unsupported,
        }
    }

    /// Guess a MIME type from a file extension.
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => "application/pdf",
            "md" | "markdown" => "text/markdown",
            "csv" => "text/csv",
            "txt" | "text" | "log" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

/// Metadata record for an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Set once the document has been ingested
    pub content_hash: Option<ContentHash>,
    /// Mean-pooled document embedding, set once ingested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(owner_id: Uuid, file_name: impl Into<String>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            content_hash: None,
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_mime(&self.mime_type)
    }

    /// Key under which the raw bytes live in the blob store.
    pub fn blob_key(&self) -> String {
        self.id.to_string()
    }

    /// Whether the record carries enough to republish its cache entry
    /// without re-encoding.
    pub fn is_ingested(&self) -> bool {
        self.content_hash.is_some() && self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}
