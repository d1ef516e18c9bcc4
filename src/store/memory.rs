//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Chunk recency is
//! the append order of the chunk list, mirroring the SQLite store's
//! creation-time ordering.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::models::{Chunk, Document, SearchFilters, Source};

use super::{apply_metadata_filter, Store};

/// In-memory store for tests and experiments.
pub struct InMemoryStore {
    sources: RwLock<HashMap<String, Source>>,
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn any_overlap(labels: &[String], wanted: &[String]) -> bool {
    labels.iter().any(|label| wanted.contains(label))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        let mut sources = self.sources.write().unwrap();
        match sources.get_mut(&source.id) {
            Some(existing) => {
                existing.name = source.name.clone();
                existing.kind = source.kind.clone();
                existing.canonical_url = source.canonical_url.clone();
                existing.ingestion_mode = source.ingestion_mode.clone();
                existing.metadata = source.metadata.clone();
                existing.updated_at = Utc::now();
            }
            None => {
                sources.insert(source.id.clone(), source.clone());
            }
        }
        Ok(())
    }

    async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        Ok(self.sources.read().unwrap().get(source_id).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let mut sources: Vec<Source> = self.sources.read().unwrap().values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn find_sources_by_url(&self, url: &str) -> Result<Vec<Source>> {
        Ok(self
            .sources
            .read()
            .unwrap()
            .values()
            .filter(|source| source.canonical_url == url)
            .cloned()
            .collect())
    }

    async fn delete_sources(&self, source_ids: &[String]) -> Result<()> {
        let mut sources = self.sources.write().unwrap();
        for id in source_ids {
            sources.remove(id);
        }
        Ok(())
    }

    async fn record_ingestion_status(
        &self,
        source_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let mut sources = self.sources.write().unwrap();
        if let Some(source) = sources.get_mut(source_id) {
            source.last_ingested_at = Some(Utc::now());
            source.last_ingestion_status = Some(status.to_string());
            source.last_error_message = error.map(|e| e.to_string());
            source.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<()> {
        {
            let mut docs = self.docs.write().unwrap();
            docs.insert(document.id.clone(), document.clone());
        }
        {
            let mut stored = self.chunks.write().unwrap();
            stored.retain(|chunk| chunk.doc_id != document.id);
            stored.extend(chunks.iter().cloned());
        }
        {
            let docs = self.docs.read().unwrap();
            let count = docs
                .values()
                .filter(|doc| doc.source_id == document.source_id)
                .count() as i64;
            let mut sources = self.sources.write().unwrap();
            if let Some(source) = sources.get_mut(&document.source_id) {
                source.doc_count = count;
                source.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(doc_id).cloned())
    }

    async fn get_chunks_for_document(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|chunk| chunk.doc_id == doc_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let docs = self.docs.read().unwrap();
        let mut topics = BTreeSet::new();
        for doc in docs.values() {
            topics.extend(doc.topics.iter().cloned());
        }
        Ok(topics.into_iter().collect())
    }

    async fn fetch_candidates(
        &self,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<(Chunk, Document)>> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();

        let mut pairs: Vec<(Chunk, Document)> = Vec::new();
        // Newest chunks first, then the cap — recency is a pre-filter,
        // not a relevance ordering.
        for chunk in chunks.iter().rev() {
            if pairs.len() as i64 >= limit {
                break;
            }
            if chunk.embedding.is_none() {
                continue;
            }
            let Some(document) = docs.get(&chunk.doc_id) else {
                continue;
            };

            if let Some(topics) = filters.topics.as_deref().filter(|t| !t.is_empty()) {
                if !any_overlap(&chunk.topics, topics) {
                    continue;
                }
            }
            if let Some(sources) = filters.sources.as_deref().filter(|s| !s.is_empty()) {
                if !sources.contains(&document.source) {
                    continue;
                }
            }
            if let Some(risk_areas) = filters.risk_areas.as_deref().filter(|r| !r.is_empty()) {
                if !any_overlap(&chunk.risk_areas, risk_areas) {
                    continue;
                }
            }
            if let Some(year_min) = filters.year_min {
                match document.published_at {
                    Some(published) if published.year() >= year_min => {}
                    _ => continue,
                }
            }
            if let Some(year_max) = filters.year_max {
                match document.published_at {
                    Some(published) if published.year() <= year_max => {}
                    _ => continue,
                }
            }

            pairs.push((chunk.clone(), document.clone()));
        }

        apply_metadata_filter(&mut pairs, filters);
        Ok(pairs)
    }
}
