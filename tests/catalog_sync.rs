//! Catalog sync tests using local files (no network: website rows are the
//! only ones fetched, so the fixtures use non-website kinds).

use std::fs;

use tempfile::TempDir;

use safety_kb::catalog::{parse_catalog_entries, sync_catalog};
use safety_kb::config::Config;
use safety_kb::embedding::ProviderRegistry;
use safety_kb::models::SearchFilters;
use safety_kb::retrieval::search;
use safety_kb::store::memory::InMemoryStore;
use safety_kb::store::Store;

const CATALOG_MD: &str = "\
# Knowledge Base Sources

| Source | Kind | Mode | Status | Docs | Last Ingested | Link |
| --- | --- | --- | --- | --- | --- | --- |
| Example Reports | pdf | manual | • | 0 |  | [link](https://example.com/reports) |
";

fn test_config(tmp: &TempDir) -> Config {
    toml::from_str(&format!(
        r#"
        [db]
        path = "{}/kb.sqlite"

        [chunking]
        chunk_size = 64
        chunk_overlap = 16

        [embedding]
        provider = "fake"
        dim = 32
        "#,
        tmp.path().display()
    ))
    .unwrap()
}

#[test]
fn parse_catalog_entries_basic() {
    let entries = parse_catalog_entries(CATALOG_MD);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Example Reports");
    assert_eq!(entries[0].kind, "pdf");
    assert_eq!(entries[0].ingestion_mode, "manual");
    assert_eq!(entries[0].url, "https://example.com/reports");
}

#[tokio::test]
async fn sync_registers_catalog_rows_and_ingests_local_files() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = InMemoryStore::new();
    let providers = ProviderRegistry::new();

    let catalog_path = tmp.path().join("sources_catalog.md");
    fs::write(&catalog_path, CATALOG_MD).unwrap();

    let sources_dir = tmp.path().join("sources").join("files");
    fs::create_dir_all(&sources_dir).unwrap();
    fs::write(
        sources_dir.join("demo.txt"),
        "Local document content about oversight evaluations.",
    )
    .unwrap();
    fs::write(
        sources_dir.join("notes.md"),
        "# Notes\n\nGovernance notes on disclosure rules.",
    )
    .unwrap();
    fs::write(sources_dir.join("ignored.bin"), b"\x00\x01").unwrap();

    sync_catalog(&store, &providers, &config, &catalog_path, &sources_dir)
        .await
        .unwrap();

    // Catalog row registered but not fetched (not a website).
    let names: Vec<String> = store
        .list_sources()
        .await
        .unwrap()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert!(names.contains(&"Example Reports".to_string()));
    assert!(names.contains(&"demo".to_string()));
    assert!(names.contains(&"notes".to_string()));
    assert!(!names.iter().any(|n| n.contains("ignored")));

    let demo = store.get_source("source_file_demo").await.unwrap().unwrap();
    assert_eq!(demo.last_ingestion_status.as_deref(), Some("success"));
    assert_eq!(demo.doc_count, 1);

    // The ingested file is searchable.
    let results = search(
        &store,
        &providers,
        &config,
        "oversight evaluations",
        5,
        &SearchFilters::default(),
    )
    .await
    .unwrap();
    assert!(results
        .iter()
        .any(|r| r.source == "source_file_demo" && r.score > 0.0));

    // The catalog was rewritten with every source.
    let markdown = fs::read_to_string(&catalog_path).unwrap();
    assert!(markdown.contains("Example Reports"));
    assert!(markdown.contains("demo"));
    assert!(markdown.contains("notes"));

    // Re-syncing reaches a fixed point: the second pass re-registers the
    // rendered rows under their catalog slugs, and from then on nothing
    // new appears.
    sync_catalog(&store, &providers, &config, &catalog_path, &sources_dir)
        .await
        .unwrap();
    let after_second = store.list_sources().await.unwrap().len();
    sync_catalog(&store, &providers, &config, &catalog_path, &sources_dir)
        .await
        .unwrap();
    assert_eq!(store.list_sources().await.unwrap().len(), after_second);
    let markdown = fs::read_to_string(&catalog_path).unwrap();
    assert_eq!(markdown.matches("Example Reports").count(), 1);
}

#[tokio::test]
async fn empty_files_record_a_failed_status() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = InMemoryStore::new();
    let providers = ProviderRegistry::new();

    let catalog_path = tmp.path().join("sources_catalog.md");
    let sources_dir = tmp.path().join("files");
    fs::create_dir_all(&sources_dir).unwrap();
    fs::write(sources_dir.join("blank.txt"), "").unwrap();

    sync_catalog(&store, &providers, &config, &catalog_path, &sources_dir)
        .await
        .unwrap();

    let blank = store
        .get_source("source_file_blank")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blank.last_ingestion_status.as_deref(), Some("failed"));
    assert_eq!(blank.last_error_message.as_deref(), Some("Empty file content"));
}
