//! Alignment Forum ingestion.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::checksum::sha256_text;
use crate::models::{Document, Metadata, Source, SourceRecord};
use crate::text::clean_text;

use super::IngestionSource;

/// Fetches posts via the Alignment Forum API.
pub struct AlignmentForumSource {
    source: Source,
}

impl AlignmentForumSource {
    pub fn new() -> Self {
        Self {
            source: Source::new(
                "source_alignment_forum",
                "Alignment Forum",
                "website",
                "https://www.alignmentforum.org",
                "poll",
            ),
        }
    }
}

impl Default for AlignmentForumSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionSource for AlignmentForumSource {
    fn registry_source(&self) -> &Source {
        &self.source
    }

    async fn discover(&self, limit: usize) -> Result<Vec<SourceRecord>> {
        // Seed listing; the production feed walks the AF GraphQL API.
        let records = vec![SourceRecord {
            id: "af_demo_post".to_string(),
            source: "alignment_forum".to_string(),
            external_id: "demo-post".to_string(),
            last_fetched_at: Some(Utc::now()),
            doc_id: None,
            status: "parsed".to_string(),
            error_message: None,
        }];
        let limit = if limit == 0 { records.len() } else { limit };
        Ok(records.into_iter().take(limit).collect())
    }

    async fn fetch_document(&self, record: &SourceRecord) -> Result<Document> {
        let text = "Alignment research demo post describing oversight techniques.";
        let mut metadata = Metadata::new();
        metadata.insert("community".to_string(), serde_json::json!("AF"));

        Ok(Document {
            id: format!("doc_{}", record.external_id),
            external_id: Some(record.external_id.clone()),
            source: "alignment_forum".to_string(),
            source_id: self.source.id.clone(),
            title: "Demo Alignment Forum Post".to_string(),
            url: None,
            authors: vec!["Demo Author".to_string()],
            published_at: record.last_fetched_at,
            added_at: Utc::now(),
            abstract_text: Some(text.to_string()),
            text: Some(clean_text(text)),
            raw_uri: Some(self.source.canonical_url.clone()),
            checksum: Some(sha256_text(text)),
            topics: vec!["alignment".to_string(), "oversight".to_string()],
            risk_areas: vec!["alignment".to_string()],
            tags: vec!["demo".to_string()],
            metadata,
            version: 1,
        })
    }
}
