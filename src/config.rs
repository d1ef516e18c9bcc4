use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive windows, in words. Must be < chunk_size.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Cap on the candidate set fetched from the store before scoring.
    #[serde(default = "default_max_candidate_chunks")]
    pub max_candidate_chunks: i64,
    /// Result count when the caller does not specify `k`.
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_candidate_chunks: default_max_candidate_chunks(),
            default_k: default_k(),
        }
    }
}

fn default_max_candidate_chunks() -> i64 {
    400
}
fn default_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// fake, openai, or local.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Vector dimensionality. Remote payloads are trusted to match;
    /// the fake provider generates exactly this many components.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Override for the remote embeddings endpoint.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dim: default_dim(),
            api_base: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "fake".to_string()
}
fn default_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_dim() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum records pulled from a source per run.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_batch_size: default_fetch_batch_size(),
        }
    }
}

fn default_fetch_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Markdown catalog file read and rewritten by `skb catalog sync`.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// Directory of local files ingested during a catalog sync.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            files_dir: default_files_dir(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("sources_catalog.md")
}
fn default_files_dir() -> PathBuf {
    PathBuf::from("sources/files")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }

    if config.retrieval.max_candidate_chunks < 1 {
        anyhow::bail!("retrieval.max_candidate_chunks must be >= 1");
    }
    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }

    if config.embedding.dim == 0 {
        anyhow::bail!("embedding.dim must be > 0");
    }
    match config.embedding.provider.as_str() {
        "fake" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be fake, openai, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"kb.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 80);
        assert_eq!(config.retrieval.max_candidate_chunks, 400);
        assert_eq!(config.embedding.provider, "fake");
        assert_eq!(config.embedding.dim, 1536);
    }

    #[test]
    fn rejects_overlap_not_less_than_size() {
        let err = parse(
            "[db]\npath = \"kb.sqlite\"\n[chunking]\nchunk_size = 16\nchunk_overlap = 16\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse("[db]\npath = \"kb.sqlite\"\n[embedding]\nprovider = \"cohere\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn rejects_zero_dim() {
        let err =
            parse("[db]\npath = \"kb.sqlite\"\n[embedding]\ndim = 0\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dim"));
    }
}
