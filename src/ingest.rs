//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: source → document → chunking → embedding →
//! storage. Documents without text produce no chunks and are skipped.
//! Provider failures abort the run and are recorded against the source's
//! ingestion status; retries belong to whatever schedules these runs, not
//! to this layer.

use anyhow::Result;

use crate::chunking::build_chunks;
use crate::config::Config;
use crate::embedding::ProviderRegistry;
use crate::models::Document;
use crate::sources::IngestionSource;
use crate::store::Store;

/// Fetch new records from a source and index them.
///
/// Upserts the source's registry entry first, skips inactive sources, and
/// stamps the registry with a `success` or `failed` status when the run
/// ends. Returns the number of documents processed.
pub async fn ingest_source(
    source: &dyn IngestionSource,
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    limit: Option<usize>,
) -> Result<u64> {
    let registry_entry = source.registry_source();
    store.upsert_source(registry_entry).await?;

    if let Some(existing) = store.get_source(&registry_entry.id).await? {
        if !existing.is_active {
            return Ok(0);
        }
    }

    let records = source
        .discover(limit.unwrap_or(config.ingest.fetch_batch_size))
        .await?;

    let mut documents = Vec::with_capacity(records.len());
    let outcome = async {
        for record in &records {
            documents.push(source.fetch_document(record).await?);
        }
        ingest_documents(&documents, store, providers, config).await
    }
    .await;

    match outcome {
        Ok(processed) => {
            store
                .record_ingestion_status(&registry_entry.id, "success", None)
                .await?;
            Ok(processed)
        }
        Err(err) => {
            store
                .record_ingestion_status(&registry_entry.id, "failed", Some(&err.to_string()))
                .await?;
            Err(err)
        }
    }
}

/// Ingest already materialized documents.
///
/// Each document is chunked, its full chunk set embedded in one batch, and
/// the result written atomically. Documents yielding no chunks are counted
/// as not processed.
pub async fn ingest_documents(
    documents: &[Document],
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
) -> Result<u64> {
    let provider = providers.get(&config.embedding)?;

    let mut processed = 0u64;
    for document in documents {
        let mut chunks = build_chunks(document, &config.chunking);
        if chunks.is_empty() {
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = provider.embed(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        store.upsert_document(document, &chunks).await?;
        processed += 1;
    }

    Ok(processed)
}
