//! Governance and policy document ingestion.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::checksum::sha256_text;
use crate::models::{Document, Metadata, Source, SourceRecord};
use crate::text::clean_text;

use super::IngestionSource;

/// Ingests regulatory and standards documents.
pub struct GovernanceSource {
    source: Source,
}

impl GovernanceSource {
    pub fn new() -> Self {
        Self {
            source: Source::new(
                "source_governance_reports",
                "Global Governance Reports",
                "pdf",
                "https://example.org/governance",
                "manual",
            ),
        }
    }
}

impl Default for GovernanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionSource for GovernanceSource {
    fn registry_source(&self) -> &Source {
        &self.source
    }

    async fn discover(&self, limit: usize) -> Result<Vec<SourceRecord>> {
        let records = vec![SourceRecord {
            id: "governance_demo".to_string(),
            source: "governance".to_string(),
            external_id: "policy-001".to_string(),
            last_fetched_at: Some(Utc::now()),
            doc_id: None,
            status: "parsed".to_string(),
            error_message: None,
        }];
        let limit = if limit == 0 { records.len() } else { limit };
        Ok(records.into_iter().take(limit).collect())
    }

    async fn fetch_document(&self, record: &SourceRecord) -> Result<Document> {
        let text = "Governance blueprint outlining evaluation and disclosure requirements.";
        let mut metadata = Metadata::new();
        metadata.insert("jurisdiction".to_string(), serde_json::json!("global"));

        Ok(Document {
            id: format!("doc_{}", record.external_id),
            external_id: Some(record.external_id.clone()),
            source: "governance".to_string(),
            source_id: self.source.id.clone(),
            title: "Safety Governance Blueprint".to_string(),
            url: None,
            authors: vec!["Policy Working Group".to_string()],
            published_at: record.last_fetched_at,
            added_at: Utc::now(),
            abstract_text: Some(text.to_string()),
            text: Some(clean_text(text)),
            raw_uri: Some(format!(
                "{}/{}.pdf",
                self.source.canonical_url, record.external_id
            )),
            checksum: Some(sha256_text(text)),
            topics: vec!["governance".to_string(), "policy".to_string()],
            risk_areas: vec!["governance".to_string()],
            tags: vec!["policy".to_string()],
            metadata,
            version: 1,
        })
    }
}
