//! Public retrieval API consumed by upstream tool integrations.
//!
//! Orchestrates a search as: embed the query (batch of one) → fetch a
//! bounded candidate set from the store → score, rank, and project into
//! [`SearchResult`]s. Scoring is a sequential scan over the candidate
//! window — there is no vector index, the store's cap is the scalability
//! guard.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{self, cosine_similarity, ProviderRegistry};
use crate::models::{Chunk, Document, SearchFilters, SearchResult};
use crate::store::Store;

/// Number of characters retained in a result snippet. A hard cut, not a
/// word-boundary one.
const SNIPPET_CHARS: usize = 400;

/// Semantic search over chunk embeddings with structured filters.
pub async fn search(
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    query: &str,
    k: usize,
    filters: &SearchFilters,
) -> Result<Vec<SearchResult>> {
    let provider = providers.get(&config.embedding)?;
    let query_vector = embedding::embed_query(provider.as_ref(), query).await?;

    let candidates = store
        .fetch_candidates(filters, config.retrieval.max_candidate_chunks)
        .await?;

    Ok(rank_candidates(&query_vector, &candidates, k))
}

/// Search constrained to a single topic.
///
/// Without explicit query text, a generic phrase seeded from the topic
/// drives the embedding, so ranking is semantic proximity to that phrase
/// filtered to the topic rather than an unscored listing.
pub async fn search_by_topic(
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    topic: &str,
    query: Option<&str>,
    k: usize,
) -> Result<Vec<SearchResult>> {
    let filters = SearchFilters {
        topics: Some(vec![topic.to_string()]),
        ..SearchFilters::default()
    };

    match query {
        Some(query) => search(store, providers, config, query, k, &filters).await,
        None => {
            let topic_query = format!("Authoritative documents about {}", topic);
            search(store, providers, config, &topic_query, k, &filters).await
        }
    }
}

/// Return a single document by identifier.
pub async fn get_document(store: &dyn Store, doc_id: &str) -> Result<Option<Document>> {
    store.get_document(doc_id).await
}

/// Return all chunks for a document, ordered by sequence index.
pub async fn get_chunks_for_document(store: &dyn Store, doc_id: &str) -> Result<Vec<Chunk>> {
    store.get_chunks_for_document(doc_id).await
}

/// List distinct topics currently stored, sorted.
pub async fn list_topics(store: &dyn Store) -> Result<Vec<String>> {
    store.list_topics().await
}

/// Score candidates against the query vector and keep the top `k`.
///
/// Candidates with a non-positive similarity are discarded — negative or
/// zero similarity is not a relevant match in this domain. The sort is
/// stable, so the candidate order (recency) breaks ties.
pub fn rank_candidates(
    query_vector: &[f32],
    candidates: &[(Chunk, Document)],
    k: usize,
) -> Vec<SearchResult> {
    let mut scored: Vec<(f32, &Chunk, &Document)> = Vec::new();
    for (chunk, document) in candidates {
        let Some(vector) = chunk.embedding.as_deref() else {
            continue;
        };
        let score = cosine_similarity(query_vector, vector);
        if score <= 0.0 {
            continue;
        }
        scored.push((score, chunk, document));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, chunk, document)| SearchResult {
            doc_id: document.id.clone(),
            title: document.title.clone(),
            url: document.url.clone(),
            snippet: chunk.text.chars().take(SNIPPET_CHARS).collect(),
            score,
            source: document.source.clone(),
            topics: document.topics.clone(),
            risk_areas: document.risk_areas.clone(),
            metadata: document.metadata.clone(),
        })
        .collect()
}
