//! AI Incident Database ingestion.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::checksum::sha256_text;
use crate::models::{Document, Metadata, Source, SourceRecord};
use crate::text::clean_text;

use super::IngestionSource;

/// Fetches cases from the AI Incident Database.
pub struct AiIncidentSource {
    source: Source,
}

impl AiIncidentSource {
    pub fn new() -> Self {
        Self {
            source: Source::new(
                "source_ai_incidents",
                "AI Incident Database",
                "website",
                "https://incidentdatabase.ai",
                "poll",
            ),
        }
    }
}

impl Default for AiIncidentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionSource for AiIncidentSource {
    fn registry_source(&self) -> &Source {
        &self.source
    }

    async fn discover(&self, limit: usize) -> Result<Vec<SourceRecord>> {
        let records = vec![SourceRecord {
            id: "aiid_demo".to_string(),
            source: "ai_incidents".to_string(),
            external_id: "incident-demo".to_string(),
            last_fetched_at: Some(Utc::now()),
            doc_id: None,
            status: "parsed".to_string(),
            error_message: None,
        }];
        let limit = if limit == 0 { records.len() } else { limit };
        Ok(records.into_iter().take(limit).collect())
    }

    async fn fetch_document(&self, record: &SourceRecord) -> Result<Document> {
        let summary = "Incident involving model hallucination that bypassed guardrails.";
        let mut metadata = Metadata::new();
        metadata.insert("severity".to_string(), serde_json::json!("medium"));

        Ok(Document {
            id: format!("doc_{}", record.external_id),
            external_id: Some(record.external_id.clone()),
            source: "ai_incidents".to_string(),
            source_id: self.source.id.clone(),
            title: "Demo Incident".to_string(),
            url: None,
            authors: vec!["Incident Reporter".to_string()],
            published_at: record.last_fetched_at,
            added_at: Utc::now(),
            abstract_text: Some(summary.to_string()),
            text: Some(clean_text(summary)),
            raw_uri: Some(format!(
                "https://incidentdatabase.ai/cases/{}",
                record.external_id
            )),
            checksum: Some(sha256_text(summary)),
            topics: vec!["incidents".to_string(), "monitoring".to_string()],
            risk_areas: vec!["governance".to_string(), "robustness".to_string()],
            tags: vec!["incident".to_string()],
            metadata,
            version: 1,
        })
    }
}
