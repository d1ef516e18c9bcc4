//! Word-window text chunker.
//!
//! Splits normalized document text into fixed-size word windows with a
//! configurable overlap, producing [`Chunk`]s tied to the parent document.
//! Chunk ids are `{doc_id}_{index}`, so re-chunking unchanged text yields
//! an identical chunk set.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document, Metadata};
use crate::text::clean_text;

/// Split text into overlapping word windows.
///
/// Windows advance by `max(chunk_size - chunk_overlap, 1)`; the final
/// window may be shorter than `chunk_size`. Empty or whitespace-only text
/// yields no windows.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }
    chunks
}

/// Clean a document's text and generate its [`Chunk`]s.
///
/// Each chunk inherits the parent's topic and risk-area labels and merges
/// the parent's metadata over a `source` key. Documents with no text yield
/// an empty set, which ingestion counts as not processed.
pub fn build_chunks(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let Some(text) = document.text.as_deref() else {
        return Vec::new();
    };

    let normalized = clean_text(text);
    let bodies = chunk_text(&normalized, config.chunk_size, config.chunk_overlap);

    bodies
        .into_iter()
        .enumerate()
        .map(|(idx, body)| {
            let mut metadata = Metadata::new();
            metadata.insert(
                "source".to_string(),
                serde_json::Value::String(document.source.clone()),
            );
            metadata.extend(document.metadata.clone());

            Chunk {
                id: format!("{}_{}", document.id, idx),
                doc_id: document.id.clone(),
                chunk_index: idx as i64,
                text: body,
                embedding: None,
                topics: document.topics.clone(),
                risk_areas: document.risk_areas.clone(),
                metadata,
            }
        })
        .collect()
}
