//! Storage abstraction for the knowledge base.
//!
//! The [`Store`] trait defines every operation the ingestion and retrieval
//! pipeline needs, so the ranking logic stays decoupled from the
//! persistence engine. The SQLite implementation is the default backend;
//! the in-memory implementation backs tests.
//!
//! The one load-bearing invariant lives behind
//! [`upsert_document`](Store::upsert_document): the document write, the
//! wholesale chunk replacement, and the source doc-count refresh happen
//! atomically, so a reader never observes a document with a stale chunk
//! set or a source whose count has not accounted for the write.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, SearchFilters, Source};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](Store::upsert_source) | Create or update a registry entry |
/// | [`record_ingestion_status`](Store::record_ingestion_status) | Stamp a source with its last run outcome |
/// | [`upsert_document`](Store::upsert_document) | Atomically write a document and replace its chunks |
/// | [`get_document`](Store::get_document) | Look up a document by id |
/// | [`get_chunks_for_document`](Store::get_chunks_for_document) | A document's chunks, ordered by index |
/// | [`list_topics`](Store::list_topics) | Deduplicated, sorted union of document topics |
/// | [`fetch_candidates`](Store::fetch_candidates) | Filtered, capped candidate pairs for scoring |
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or update a source registry entry.
    ///
    /// Updating preserves the bookkeeping fields (last-run status, doc
    /// count, active flag) — those are owned by the ingestion
    /// orchestrator, the document write path, and the operator
    /// respectively.
    async fn upsert_source(&self, source: &Source) -> Result<()>;

    /// Look up a source by registry id.
    async fn get_source(&self, source_id: &str) -> Result<Option<Source>>;

    /// All sources, ordered by name.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Sources whose canonical URL matches exactly.
    async fn find_sources_by_url(&self, url: &str) -> Result<Vec<Source>>;

    /// Remove sources by registry id.
    async fn delete_sources(&self, source_ids: &[String]) -> Result<()>;

    /// Stamp a source with the outcome of an ingestion run. Unknown ids
    /// are ignored.
    async fn record_ingestion_status(
        &self,
        source_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()>;

    /// Insert or update a document and wholesale-replace its chunk set,
    /// refreshing the owning source's doc count, in one atomic write.
    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<()>;

    /// Look up a document by id.
    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>>;

    /// A document's chunks, ordered by sequence index.
    async fn get_chunks_for_document(&self, doc_id: &str) -> Result<Vec<Chunk>>;

    /// Deduplicated, sorted union of all document topic labels.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Candidate `(chunk, document)` pairs for scoring.
    ///
    /// Pairs are ordered by chunk creation time descending before the cap
    /// is applied — a recency bias used as a cheap pre-filter, not a
    /// relevance ordering. Chunks without an embedding are excluded.
    /// Label and year filters are applied by the storage engine; metadata
    /// equality is checked in the application layer after the cap, because
    /// metadata is a schema-less mapping.
    async fn fetch_candidates(
        &self,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<(Chunk, Document)>>;
}

/// Drop pairs whose document metadata does not satisfy every equality
/// constraint. Shared by store implementations — this runs after the
/// storage-level filters and the candidate cap.
pub(crate) fn apply_metadata_filter(
    pairs: &mut Vec<(Chunk, Document)>,
    filters: &SearchFilters,
) {
    if filters.metadata.is_empty() {
        return;
    }
    pairs.retain(|(_, document)| {
        filters
            .metadata
            .iter()
            .all(|(key, value)| document.metadata.get(key) == Some(value))
    });
}
