//! Ingestion source adapters.
//!
//! Each source owns its registry [`Source`] entry and produces
//! [`SourceRecord`]s and [`Document`]s through the common
//! [`IngestionSource`] trait; the orchestrator in [`crate::ingest`] drives
//! the rest of the pipeline.

pub mod alignment_forum;
pub mod arxiv;
pub mod governance;
pub mod incidents;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, Source, SourceRecord};

pub use alignment_forum::AlignmentForumSource;
pub use arxiv::ArxivSource;
pub use governance::GovernanceSource;
pub use incidents::AiIncidentSource;

/// Common interface for data sources.
#[async_trait]
pub trait IngestionSource: Send + Sync {
    /// The registry entry describing this ingestion pipeline.
    fn registry_source(&self) -> &Source;

    /// Discover new or updated upstream items, up to `limit`.
    async fn discover(&self, limit: usize) -> Result<Vec<SourceRecord>>;

    /// Fetch and parse the document for a previously discovered record.
    async fn fetch_document(&self, record: &SourceRecord) -> Result<Document>;
}

/// Look up a built-in source by CLI name.
pub fn builtin_source(name: &str) -> Option<Box<dyn IngestionSource>> {
    match name {
        "alignment-forum" => Some(Box::new(AlignmentForumSource::new())),
        "arxiv" => Some(Box::new(ArxivSource::new())),
        "governance" => Some(Box::new(GovernanceSource::new())),
        "incidents" => Some(Box::new(AiIncidentSource::new())),
        _ => None,
    }
}

/// All built-in sources, in a stable order.
pub fn builtin_sources() -> Vec<Box<dyn IngestionSource>> {
    vec![
        Box::new(AlignmentForumSource::new()),
        Box::new(ArxivSource::new()),
        Box::new(GovernanceSource::new()),
        Box::new(AiIncidentSource::new()),
    ]
}

/// CLI names of the built-in sources.
pub const BUILTIN_SOURCE_NAMES: &[&str] = &["alignment-forum", "arxiv", "governance", "incidents"];
