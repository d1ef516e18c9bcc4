//! arXiv feed ingestion.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::checksum::sha256_text;
use crate::models::{Document, Metadata, Source, SourceRecord};
use crate::text::clean_text;

use super::IngestionSource;

/// Parses arXiv search feeds for AI-safety related papers.
pub struct ArxivSource {
    source: Source,
}

impl ArxivSource {
    pub fn new() -> Self {
        let mut source = Source::new(
            "source_arxiv_alignment",
            "arXiv AI Safety Feed",
            "website",
            "https://arxiv.org",
            "poll",
        );
        source
            .metadata
            .insert("query".to_string(), serde_json::json!("AI safety"));
        Self { source }
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionSource for ArxivSource {
    fn registry_source(&self) -> &Source {
        &self.source
    }

    async fn discover(&self, limit: usize) -> Result<Vec<SourceRecord>> {
        let records = vec![SourceRecord {
            id: "arxiv_demo".to_string(),
            source: "arxiv".to_string(),
            external_id: "2301.00001".to_string(),
            last_fetched_at: Some(Utc::now()),
            doc_id: None,
            status: "parsed".to_string(),
            error_message: None,
        }];
        let limit = if limit == 0 { records.len() } else { limit };
        Ok(records.into_iter().take(limit).collect())
    }

    async fn fetch_document(&self, record: &SourceRecord) -> Result<Document> {
        let text = "Paper abstract describing scalable oversight and evaluation protocols.";
        let mut metadata = Metadata::new();
        metadata.insert("arxiv_category".to_string(), serde_json::json!("cs.AI"));

        Ok(Document {
            id: format!("doc_{}", record.external_id),
            external_id: Some(record.external_id.clone()),
            source: "arxiv".to_string(),
            source_id: self.source.id.clone(),
            title: "Scalable Oversight Evaluations".to_string(),
            url: None,
            authors: vec![
                "Researcher One".to_string(),
                "Researcher Two".to_string(),
            ],
            published_at: record.last_fetched_at,
            added_at: Utc::now(),
            abstract_text: Some(text.to_string()),
            text: Some(clean_text(text)),
            raw_uri: Some(format!("https://arxiv.org/abs/{}", record.external_id)),
            checksum: Some(sha256_text(text)),
            topics: vec!["evals".to_string(), "oversight".to_string()],
            risk_areas: vec!["robustness".to_string()],
            tags: vec!["arxiv".to_string()],
            metadata,
            version: 1,
        })
    }
}
