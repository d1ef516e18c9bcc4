//! Human-readable source catalog: a markdown table that doubles as input.
//!
//! `render_catalog_markdown` materializes the registry as a table;
//! `sync_catalog` reads that table back, ingests its website rows and any
//! local files under the configured sources directory, then rewrites the
//! file with fresh statuses and doc counts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use walkdir::WalkDir;

use crate::checksum::{sha256_file, sha256_text};
use crate::config::Config;
use crate::embedding::ProviderRegistry;
use crate::ingest::ingest_documents;
use crate::models::{Document, Metadata, Source};
use crate::store::Store;
use crate::text::clean_text;

const ALLOWED_SUFFIXES: &[&str] = &["txt", "md", "html", "htm", "pdf"];

/// Characters kept of a document abstract. A hard cut.
const ABSTRACT_CHARS: usize = 400;

/// A row parsed back out of the catalog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub kind: String,
    pub ingestion_mode: String,
    pub url: String,
}

impl CatalogEntry {
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lowercase, collapse non-alphanumeric runs to `-`, trim the ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "source".to_string()
    } else {
        slug
    }
}

fn status_emoji(status: Option<&str>) -> &'static str {
    match status {
        Some("success") => "✅",
        Some("failed") => "❌",
        Some("pending") => "⏳",
        _ => "•",
    }
}

/// Render a markdown table describing all registered sources.
pub async fn render_catalog_markdown(store: &dyn Store) -> Result<String> {
    let sources = store.list_sources().await?;
    if sources.is_empty() {
        return Ok("# Knowledge Base Sources\n\n_No sources registered yet._\n".to_string());
    }

    let mut lines = vec![
        "# Knowledge Base Sources".to_string(),
        String::new(),
        "| Source | Kind | Mode | Status | Docs | Last Ingested | Link |".to_string(),
        "| --- | --- | --- | --- | --- | --- | --- |".to_string(),
    ];
    for source in &sources {
        let status = source.last_ingestion_status.as_deref();
        let last_ingested = source
            .last_ingested_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        lines.push(format!(
            "| {} | {} | {} | {} {} | {} | {} | [link]({}) |",
            source.name,
            source.kind,
            source.ingestion_mode,
            status_emoji(status),
            status.unwrap_or(""),
            source.doc_count,
            last_ingested,
            source.canonical_url,
        ));
    }
    lines.push(String::new());
    Ok(lines.join("\n"))
}

/// Render the catalog and write it to `output_path`.
pub async fn generate_catalog_file(store: &dyn Store, output_path: &Path) -> Result<PathBuf> {
    let markdown = render_catalog_markdown(store).await?;
    std::fs::write(output_path, markdown)
        .with_context(|| format!("Failed to write catalog: {}", output_path.display()))?;
    Ok(output_path.to_path_buf())
}

/// Parse table rows back into entries. Rows without a `[…](url)` link cell
/// are skipped, as are separator rows.
pub fn parse_catalog_entries(markdown: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    for line in markdown.lines() {
        let line = line.trim();
        if !line.starts_with('|') {
            continue;
        }
        let parts: Vec<&str> = line
            .trim_matches('|')
            .split('|')
            .map(|part| part.trim())
            .collect();
        if parts.len() < 7 {
            continue;
        }
        if parts[0].starts_with("---") {
            continue;
        }
        let Some(url) = extract_link_target(parts[6]) else {
            continue;
        };
        entries.push(CatalogEntry {
            name: parts[0].to_string(),
            kind: parts[1].to_string(),
            ingestion_mode: parts[2].to_string(),
            url,
        });
    }
    entries
}

/// Pull the target out of a markdown `[label](target)` cell.
fn extract_link_target(cell: &str) -> Option<String> {
    let open = cell.find("](")?;
    let rest = &cell[open + 2..];
    let close = rest.find(')')?;
    if close == 0 {
        return None;
    }
    Some(rest[..close].to_string())
}

/// Fetch a URL's body as text.
async fn fetch_url_text(url: &str) -> Result<String> {
    let response = reqwest::get(url).await?;
    let response = response.error_for_status()?;
    Ok(response.text().await?)
}

/// Register catalog entries and ingest the website ones.
///
/// Failures are recorded against the individual source and the sync moves
/// on to the next entry rather than aborting the run.
pub async fn ingest_catalog_links(
    entries: &[CatalogEntry],
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
) -> Result<()> {
    for entry in entries {
        let source = Source::new(
            format!("source_{}", entry.slug()),
            entry.name.clone(),
            entry.kind.clone(),
            entry.url.clone(),
            entry.ingestion_mode.clone(),
        );
        store.upsert_source(&source).await?;

        if !entry.kind.eq_ignore_ascii_case("website") {
            continue;
        }

        let raw_html = match fetch_url_text(&entry.url).await {
            Ok(body) => body,
            Err(err) => {
                store
                    .record_ingestion_status(&source.id, "failed", Some(&err.to_string()))
                    .await?;
                continue;
            }
        };

        let text = clean_text(&raw_html);
        if text.is_empty() {
            store
                .record_ingestion_status(&source.id, "failed", Some("Empty response"))
                .await?;
            continue;
        }

        let checksum = sha256_text(&text);
        let document = catalog_document(&source, &entry.url, &entry.name, text, checksum);
        let mut metadata = Metadata::new();
        metadata.insert("source_type".to_string(), serde_json::json!("catalog_link"));
        let document = Document {
            external_id: Some(entry.url.clone()),
            metadata,
            ..document
        };

        match ingest_documents(&[document], store, providers, config).await {
            Ok(_) => {
                store
                    .record_ingestion_status(&source.id, "success", None)
                    .await?;
            }
            Err(err) => {
                store
                    .record_ingestion_status(&source.id, "failed", Some(&err.to_string()))
                    .await?;
            }
        }
    }
    Ok(())
}

/// Files under the sources directory with an ingestible suffix, sorted for
/// deterministic ordering.
pub fn discover_local_files(sources_dir: &Path) -> Vec<PathBuf> {
    if !sources_dir.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(sources_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ALLOWED_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Read and clean a local file's text; PDFs go through text extraction.
pub fn read_local_file_text(path: &Path) -> Result<String> {
    let suffix = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let text = if suffix == "pdf" {
        pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract PDF text: {}", path.display()))?
    } else {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        String::from_utf8_lossy(&bytes).into_owned()
    };

    Ok(clean_text(&text))
}

/// Ingest local files, one registry source per file.
pub async fn ingest_local_files(
    files: &[PathBuf],
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
) -> Result<()> {
    for path in files {
        let relative_uri = path.to_string_lossy().replace('\\', "/");
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let slug = slugify(&name);

        let source = Source::new(
            format!("source_file_{}", slug),
            name.clone(),
            "file",
            format!("./{}", relative_uri),
            "snapshot",
        );
        store.upsert_source(&source).await?;

        let text = match read_local_file_text(path) {
            Ok(text) => text,
            Err(err) => {
                store
                    .record_ingestion_status(&source.id, "failed", Some(&err.to_string()))
                    .await?;
                continue;
            }
        };
        if text.is_empty() {
            store
                .record_ingestion_status(&source.id, "failed", Some("Empty file content"))
                .await?;
            continue;
        }

        let checksum = sha256_file(path)?;
        let document = catalog_document(&source, &relative_uri, &name, text, checksum);
        let mut metadata = Metadata::new();
        metadata.insert(
            "local_path".to_string(),
            serde_json::json!(relative_uri.clone()),
        );
        let document = Document {
            external_id: path
                .file_name()
                .map(|file| file.to_string_lossy().into_owned()),
            url: None,
            metadata,
            ..document
        };

        match ingest_documents(&[document], store, providers, config).await {
            Ok(_) => {
                store
                    .record_ingestion_status(&source.id, "success", None)
                    .await?;
            }
            Err(err) => {
                store
                    .record_ingestion_status(&source.id, "failed", Some(&err.to_string()))
                    .await?;
            }
        }
    }
    Ok(())
}

fn catalog_document(
    source: &Source,
    uri: &str,
    title: &str,
    text: String,
    checksum: String,
) -> Document {
    let abstract_text: String = text.chars().take(ABSTRACT_CHARS).collect();
    Document {
        id: format!("{}_{}", source.id, &checksum[..12]),
        external_id: None,
        source: source.id.clone(),
        source_id: source.id.clone(),
        title: title.to_string(),
        url: Some(uri.to_string()),
        authors: Vec::new(),
        published_at: None,
        added_at: Utc::now(),
        abstract_text: Some(abstract_text),
        text: Some(text),
        raw_uri: Some(uri.to_string()),
        checksum: Some(checksum),
        topics: Vec::new(),
        risk_areas: Vec::new(),
        tags: Vec::new(),
        metadata: Metadata::new(),
        version: 1,
    }
}

/// Full sync: parse the catalog, ingest its entries and the local sources
/// directory, then rewrite the catalog with fresh statuses.
pub async fn sync_catalog(
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    catalog_path: &Path,
    sources_dir: &Path,
) -> Result<PathBuf> {
    let markdown = if catalog_path.exists() {
        std::fs::read_to_string(catalog_path)
            .with_context(|| format!("Failed to read catalog: {}", catalog_path.display()))?
    } else {
        String::new()
    };

    let entries = parse_catalog_entries(&markdown);
    ingest_catalog_links(&entries, store, providers, config).await?;

    let files = discover_local_files(sources_dir);
    ingest_local_files(&files, store, providers, config).await?;

    generate_catalog_file(store, catalog_path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("AI Incident Database"), "ai-incident-database");
        assert_eq!(slugify("  Weird -- Name!! "), "weird-name");
        assert_eq!(slugify("***"), "source");
    }

    #[test]
    fn parses_entries_and_skips_separators() {
        let markdown = "\
# Knowledge Base Sources

| Source | Kind | Mode | Status | Docs | Last Ingested | Link |
| --- | --- | --- | --- | --- | --- | --- |
| Demo Site | website | poll | ✅ success | 3 | 2025-01-01T00:00:00+00:00 | [link](https://example.com) |
| No Link | website | poll | • | 0 |  | missing |
";
        let entries = parse_catalog_entries(markdown);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0],
            CatalogEntry {
                name: "Demo Site".to_string(),
                kind: "website".to_string(),
                ingestion_mode: "poll".to_string(),
                url: "https://example.com".to_string(),
            }
        );
        assert_eq!(entries[0].slug(), "demo-site");
    }

    #[test]
    fn extract_link_target_handles_malformed_cells() {
        assert_eq!(
            extract_link_target("[link](https://a.example)"),
            Some("https://a.example".to_string())
        );
        assert_eq!(extract_link_target("no link here"), None);
        assert_eq!(extract_link_target("[link]()"), None);
    }

    #[tokio::test]
    async fn renders_placeholder_without_sources() {
        let store = crate::store::memory::InMemoryStore::new();
        let markdown = render_catalog_markdown(&store).await.unwrap();
        assert!(markdown.contains("_No sources registered yet._"));
    }

    #[tokio::test]
    async fn render_and_parse_round_trip() {
        let store = crate::store::memory::InMemoryStore::new();
        let store_ref: &dyn Store = &store;
        store_ref
            .upsert_source(&Source::new(
                "source_demo",
                "Demo Site",
                "website",
                "https://example.com",
                "poll",
            ))
            .await
            .unwrap();

        let markdown = render_catalog_markdown(store_ref).await.unwrap();
        let entries = parse_catalog_entries(&markdown);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Demo Site");
        assert_eq!(entries[0].url, "https://example.com");
    }
}
