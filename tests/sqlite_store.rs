//! SQLite store contract tests against a scratch database.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use safety_kb::config::Config;
use safety_kb::embedding::ProviderRegistry;
use safety_kb::ingest::ingest_documents;
use safety_kb::models::{Document, Metadata, SearchFilters, Source};
use safety_kb::retrieval::search;
use safety_kb::store::sqlite::SqliteStore;
use safety_kb::store::Store;

const TEST_SOURCE_ID: &str = "source_unit_test";

fn test_config(tmp: &TempDir) -> Config {
    toml::from_str(&format!(
        r#"
        [db]
        path = "{}/kb.sqlite"

        [chunking]
        chunk_size = 64
        chunk_overlap = 16

        [retrieval]
        max_candidate_chunks = 50

        [embedding]
        provider = "fake"
        dim = 32
        "#,
        tmp.path().display()
    ))
    .unwrap()
}

async fn open_store(config: &Config) -> SqliteStore {
    let store = SqliteStore::connect(&config.db.path).await.unwrap();
    store.init_schema().await.unwrap();
    store
        .upsert_source(&Source::new(
            TEST_SOURCE_ID,
            "Unit Test Corpus",
            "repo",
            "https://example.com/corpus",
            "manual",
        ))
        .await
        .unwrap();
    store
}

fn demo_document() -> Document {
    let mut metadata = Metadata::new();
    metadata.insert("scope".to_string(), serde_json::json!("demo"));
    Document {
        id: "doc_demo".to_string(),
        external_id: Some("demo".to_string()),
        source: "unit_test".to_string(),
        source_id: TEST_SOURCE_ID.to_string(),
        title: "Testing Oversight".to_string(),
        url: Some("https://example.com/demo".to_string()),
        authors: vec!["Tester".to_string()],
        published_at: Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()),
        added_at: Utc::now(),
        abstract_text: Some("Demo".to_string()),
        text: Some("Alignment oversight helps detect deception in AI systems.".to_string()),
        raw_uri: Some("https://example.com/demo.pdf".to_string()),
        checksum: Some("demo_checksum".to_string()),
        topics: vec!["alignment".to_string()],
        risk_areas: vec!["alignment".to_string()],
        tags: vec!["test".to_string()],
        metadata,
        version: 1,
    }
}

#[tokio::test]
async fn schema_init_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = SqliteStore::connect(&config.db.path).await.unwrap();
    store.init_schema().await.unwrap();
    store.init_schema().await.unwrap();
    store.close().await;
}

#[tokio::test]
async fn document_round_trip_preserves_fields() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;
    let providers = ProviderRegistry::new();

    ingest_documents(&[demo_document()], &store, &providers, &config)
        .await
        .unwrap();

    let stored = store.get_document("doc_demo").await.unwrap().unwrap();
    assert_eq!(stored.title, "Testing Oversight");
    assert_eq!(stored.source, "unit_test");
    assert_eq!(stored.source_id, TEST_SOURCE_ID);
    assert_eq!(stored.topics, vec!["alignment".to_string()]);
    assert_eq!(stored.authors, vec!["Tester".to_string()]);
    assert_eq!(stored.metadata.get("scope"), Some(&serde_json::json!("demo")));
    assert_eq!(stored.checksum.as_deref(), Some("demo_checksum"));
    assert_eq!(
        stored.published_at.map(|ts| ts.timestamp()),
        Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap().timestamp())
    );

    let chunks = store.get_chunks_for_document("doc_demo").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].id, "doc_demo_0");
    assert_eq!(chunks[0].chunk_index, 0);
    assert!(chunks[0].embedding.is_some());
    assert_eq!(chunks[0].embedding.as_ref().unwrap().len(), 32);

    assert!(store.get_document("doc_unknown").await.unwrap().is_none());
    store.close().await;
}

#[tokio::test]
async fn search_end_to_end_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;
    let providers = ProviderRegistry::new();

    ingest_documents(&[demo_document()], &store, &providers, &config)
        .await
        .unwrap();

    let filters = SearchFilters {
        topics: Some(vec!["alignment".to_string()]),
        ..SearchFilters::default()
    };
    let results = search(&store, &providers, &config, "detecting deception", 3, &filters)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].doc_id, "doc_demo");
    assert!(results[0].score > 0.0);

    // Filter to a topic the document does not carry.
    let filters = SearchFilters {
        topics: Some(vec!["governance".to_string()]),
        ..SearchFilters::default()
    };
    let results = search(&store, &providers, &config, "detecting deception", 3, &filters)
        .await
        .unwrap();
    assert!(results.is_empty());
    store.close().await;
}

#[tokio::test]
async fn candidate_filters_run_in_the_database() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;
    let providers = ProviderRegistry::new();

    let mut old_doc = demo_document();
    old_doc.id = "doc_old".to_string();
    old_doc.published_at = Some(Utc.with_ymd_and_hms(2018, 3, 1, 0, 0, 0).unwrap());
    old_doc.text = Some("Older notes about oversight methods.".to_string());
    ingest_documents(&[demo_document(), old_doc], &store, &providers, &config)
        .await
        .unwrap();

    let filters = SearchFilters {
        year_min: Some(2020),
        ..SearchFilters::default()
    };
    let pairs = store.fetch_candidates(&filters, 50).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].1.id, "doc_demo");

    let filters = SearchFilters {
        year_max: Some(2018),
        ..SearchFilters::default()
    };
    let pairs = store.fetch_candidates(&filters, 50).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].1.id, "doc_old");

    let filters = SearchFilters {
        risk_areas: Some(vec!["robustness".to_string()]),
        ..SearchFilters::default()
    };
    let pairs = store.fetch_candidates(&filters, 50).await.unwrap();
    assert!(pairs.is_empty());

    // The cap bounds the candidate window.
    let pairs = store
        .fetch_candidates(&SearchFilters::default(), 1)
        .await
        .unwrap();
    assert_eq!(pairs.len(), 1);
    store.close().await;
}

#[tokio::test]
async fn doc_count_tracks_documents_per_source() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;
    let providers = ProviderRegistry::new();

    let mut second = demo_document();
    second.id = "doc_second".to_string();
    second.text = Some("Another oversight document entirely.".to_string());

    ingest_documents(&[demo_document(), second], &store, &providers, &config)
        .await
        .unwrap();
    let source = store.get_source(TEST_SOURCE_ID).await.unwrap().unwrap();
    assert_eq!(source.doc_count, 2);

    // Re-ingesting does not double-count.
    ingest_documents(&[demo_document()], &store, &providers, &config)
        .await
        .unwrap();
    let source = store.get_source(TEST_SOURCE_ID).await.unwrap().unwrap();
    assert_eq!(source.doc_count, 2);
    store.close().await;
}

#[tokio::test]
async fn source_registry_updates_and_lookup() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;

    let sources = store.list_sources().await.unwrap();
    assert!(sources.iter().any(|s| s.id == TEST_SOURCE_ID));

    store
        .record_ingestion_status(TEST_SOURCE_ID, "success", None)
        .await
        .unwrap();
    let updated = store.get_source(TEST_SOURCE_ID).await.unwrap().unwrap();
    assert_eq!(updated.last_ingestion_status.as_deref(), Some("success"));
    assert!(updated.last_ingested_at.is_some());

    store
        .record_ingestion_status(TEST_SOURCE_ID, "failed", Some("boom"))
        .await
        .unwrap();
    let updated = store.get_source(TEST_SOURCE_ID).await.unwrap().unwrap();
    assert_eq!(updated.last_ingestion_status.as_deref(), Some("failed"));
    assert_eq!(updated.last_error_message.as_deref(), Some("boom"));

    let by_url = store
        .find_sources_by_url("https://example.com/corpus")
        .await
        .unwrap();
    assert_eq!(by_url.len(), 1);

    store
        .delete_sources(&[TEST_SOURCE_ID.to_string()])
        .await
        .unwrap();
    assert!(store.get_source(TEST_SOURCE_ID).await.unwrap().is_none());
    store.close().await;
}

#[tokio::test]
async fn list_topics_unions_across_documents() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = open_store(&config).await;
    let providers = ProviderRegistry::new();

    let mut governance = demo_document();
    governance.id = "doc_governance".to_string();
    governance.topics = vec!["governance".to_string(), "alignment".to_string()];
    governance.text = Some("Policy notes about audits.".to_string());

    ingest_documents(&[demo_document(), governance], &store, &providers, &config)
        .await
        .unwrap();

    let topics = store.list_topics().await.unwrap();
    assert_eq!(topics, vec!["alignment".to_string(), "governance".to_string()]);
    store.close().await;
}
