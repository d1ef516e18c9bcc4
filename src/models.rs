//! Core data models for the knowledge base.
//!
//! These types represent the sources, documents, chunks, and search results
//! that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata mapping attached to documents, chunks, and sources.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Logical representation of an ingested document or post.
///
/// Owned by whichever source pipeline created it. Re-ingestion replaces the
/// text, metadata, and chunk set; the checksum changes if and only if the
/// text content changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    /// Source label (e.g. `"alignment_forum"`), distinct from the registry id.
    pub source: String,
    /// Registry id of the [`Source`] this document belongs to.
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub raw_uri: Option<String>,
    /// SHA-256 of the text content.
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub risk_areas: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default = "default_version")]
    pub version: i64,
}

fn default_version() -> i64 {
    1
}

/// Minimal retrieval unit referencing a document.
///
/// Chunk ids are `{doc_id}_{index}`, so re-chunking the same text is
/// idempotent. Indices are contiguous starting at 0 and their order within
/// a document is meaningful. The embedding is absent until the chunk has
/// been run through a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: i64,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub risk_areas: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Registry entry describing a canonical data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// website, file, pdf, repo, ...
    pub kind: String,
    pub canonical_url: String,
    /// poll, manual, or snapshot.
    pub ingestion_mode: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_ingested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_ingestion_status: Option<String>,
    #[serde(default)]
    pub last_error_message: Option<String>,
    /// Materialized count of documents referencing this source, refreshed
    /// on every document write.
    #[serde(default)]
    pub doc_count: i64,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Source {
    /// Fresh registry entry with bookkeeping fields zeroed.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        canonical_url: impl Into<String>,
        ingestion_mode: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            canonical_url: canonical_url.into(),
            ingestion_mode: ingestion_mode.into(),
            is_active: true,
            last_ingested_at: None,
            last_ingestion_status: None,
            last_error_message: None,
            doc_count: 0,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tracks ingestion provenance for a single upstream item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub source: String,
    pub external_id: String,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default = "default_record_status")]
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_record_status() -> String {
    "new".to_string()
}

/// Supported constraints for structured queries. All provided constraints
/// are ANDed; the label-set constraints are any-of matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub risk_areas: Option<Vec<String>>,
    /// Inclusive publication-year lower bound.
    #[serde(default)]
    pub year_min: Option<i32>,
    /// Inclusive publication-year upper bound.
    #[serde(default)]
    pub year_max: Option<i32>,
    /// Exact-equality constraints on document metadata keys.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Chunk-level search hit projected with its parent document's context.
///
/// One result per winning chunk — two chunks of the same document can both
/// appear in a result list.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub title: String,
    pub url: Option<String>,
    /// First 400 characters of the chunk text (hard cut).
    pub snippet: String,
    pub score: f32,
    pub source: String,
    pub topics: Vec<String>,
    pub risk_areas: Vec<String>,
    pub metadata: Metadata,
}
