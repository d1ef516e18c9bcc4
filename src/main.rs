//! # Safety KB CLI (`skb`)
//!
//! The `skb` binary is the primary interface for the knowledge base. It
//! provides commands for database initialization, source ingestion,
//! semantic search, document retrieval, and catalog management.
//!
//! ## Usage
//!
//! ```bash
//! skb --config ./config/skb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `skb init` | Create the SQLite database and schema |
//! | `skb sources` | List registered sources and their ingestion status |
//! | `skb sync <source>` | Ingest a built-in source (or `all`) |
//! | `skb search "<query>"` | Semantic search with structured filters |
//! | `skb topics` | List the distinct topics currently indexed |
//! | `skb get <id>` | Print a document and its chunks |
//! | `skb catalog render` | Write the markdown source catalog |
//! | `skb catalog sync` | Ingest catalog links and local files |

mod catalog;
mod checksum;
mod chunking;
mod config;
mod embedding;
mod error;
mod ingest;
mod models;
mod retrieval;
mod sources;
mod store;
mod text;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::embedding::ProviderRegistry;
use crate::models::SearchFilters;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Safety KB — ingestion and semantic retrieval for an AI-safety
/// document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file covering the database path, chunking, retrieval, and embedding
/// settings.
#[derive(Parser)]
#[command(
    name = "skb",
    about = "Safety KB — knowledge-base ingestion and semantic retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/skb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (sources,
    /// documents, chunks). Idempotent — running it again is safe.
    Init,

    /// List registered sources and their last ingestion status.
    Sources,

    /// Ingest a built-in source.
    ///
    /// Discovers new records, chunks and embeds their documents, and
    /// stores everything. `all` runs every built-in source in turn.
    Sync {
        /// Source name: alignment-forum, arxiv, governance, incidents,
        /// or `all`.
        source: String,

        /// Maximum number of records to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Semantic search over chunk embeddings.
    ///
    /// Embeds the query, scores it against the filtered candidate set,
    /// and prints the ranked results.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        k: Option<usize>,

        /// Restrict to chunks carrying this topic label (repeatable).
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Restrict to documents from this source label (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Restrict to chunks carrying this risk-area label (repeatable).
        #[arg(long = "risk-area")]
        risk_areas: Vec<String>,

        /// Only documents published in or after this year.
        #[arg(long)]
        year_min: Option<i32>,

        /// Only documents published in or before this year.
        #[arg(long)]
        year_max: Option<i32>,
    },

    /// List the distinct topics currently indexed.
    Topics,

    /// Print a document and its chunks by id.
    Get {
        /// Document id.
        id: String,
    },

    /// Manage the markdown source catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

/// Catalog subcommands.
#[derive(Subcommand)]
enum CatalogAction {
    /// Write the catalog markdown describing all registered sources.
    Render {
        /// Output path; defaults to the configured catalog path.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Ingest catalog website entries and local source files, then
    /// rewrite the catalog with fresh statuses.
    Sync {
        /// Catalog markdown to read and rewrite; defaults to the
        /// configured catalog path.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Directory of local files to ingest; defaults to the configured
        /// sources directory.
        #[arg(long)]
        files_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    let store = SqliteStore::connect(&config.db.path).await?;
    let providers = ProviderRegistry::new();

    match cli.command {
        Commands::Init => {
            store.init_schema().await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            print_sources(&store).await?;
        }
        Commands::Sync { source, limit } => {
            run_sync(&store, &providers, &config, &source, limit).await?;
        }
        Commands::Search {
            query,
            k,
            topics,
            sources,
            risk_areas,
            year_min,
            year_max,
        } => {
            let filters = SearchFilters {
                topics: (!topics.is_empty()).then_some(topics),
                sources: (!sources.is_empty()).then_some(sources),
                risk_areas: (!risk_areas.is_empty()).then_some(risk_areas),
                year_min,
                year_max,
                metadata: models::Metadata::new(),
            };
            let k = k.unwrap_or(config.retrieval.default_k);
            run_search(&store, &providers, &config, &query, k, &filters).await?;
        }
        Commands::Topics => {
            let topics = retrieval::list_topics(&store).await?;
            if topics.is_empty() {
                println!("No topics indexed yet.");
            } else {
                for topic in topics {
                    println!("{}", topic);
                }
            }
        }
        Commands::Get { id } => {
            run_get(&store, &id).await?;
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Render { output } => {
                let output = output.unwrap_or_else(|| config.catalog.path.clone());
                let path = catalog::generate_catalog_file(&store, &output).await?;
                println!("Catalog written to {}", path.display());
            }
            CatalogAction::Sync { catalog, files_dir } => {
                let catalog_path = catalog.unwrap_or_else(|| config.catalog.path.clone());
                let files_dir = files_dir.unwrap_or_else(|| config.catalog.files_dir.clone());
                let path = catalog::sync_catalog(
                    &store,
                    &providers,
                    &config,
                    &catalog_path,
                    &files_dir,
                )
                .await?;
                println!("Catalog synced: {}", path.display());
            }
        },
    }

    store.close().await;
    Ok(())
}

async fn print_sources(store: &dyn Store) -> Result<()> {
    let sources = store.list_sources().await?;
    if sources.is_empty() {
        println!("No sources registered yet.");
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:<10} {:<10} {:>5}  LAST INGESTED",
        "SOURCE", "KIND", "MODE", "STATUS", "DOCS"
    );
    for source in &sources {
        let status = source.last_ingestion_status.as_deref().unwrap_or("-");
        let last = source
            .last_ingested_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<28} {:<10} {:<10} {:<10} {:>5}  {}",
            source.name, source.kind, source.ingestion_mode, status, source.doc_count, last
        );
        if let Some(ref error) = source.last_error_message {
            println!("    error: {}", error);
        }
    }
    Ok(())
}

async fn run_sync(
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    source_name: &str,
    limit: Option<usize>,
) -> Result<()> {
    let selected: Vec<Box<dyn sources::IngestionSource>> = if source_name == "all" {
        sources::builtin_sources()
    } else {
        match sources::builtin_source(source_name) {
            Some(source) => vec![source],
            None => bail!(
                "Unknown source: '{}'. Available: {}, all",
                source_name,
                sources::BUILTIN_SOURCE_NAMES.join(", ")
            ),
        }
    };

    for source in &selected {
        let name = source.registry_source().name.clone();
        match ingest::ingest_source(source.as_ref(), store, providers, config, limit).await {
            Ok(processed) => {
                println!("sync {}", name);
                println!("  processed: {} documents", processed);
                println!("ok");
            }
            Err(err) => {
                eprintln!("Warning: sync {} failed: {}", name, err);
            }
        }
    }
    Ok(())
}

async fn run_search(
    store: &dyn Store,
    providers: &ProviderRegistry,
    config: &Config,
    query: &str,
    k: usize,
    filters: &SearchFilters,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = retrieval::search(store, providers, config, query, k, filters).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.source,
            result.title
        );
        if !result.topics.is_empty() {
            println!("    topics: {}", result.topics.join(", "));
        }
        if let Some(ref url) = result.url {
            println!("    url: {}", url);
        }
        println!("    excerpt: \"{}\"", result.snippet.replace('\n', " "));
        println!("    id: {}", result.doc_id);
        println!();
    }
    Ok(())
}

async fn run_get(store: &dyn Store, id: &str) -> Result<()> {
    let document = match retrieval::get_document(store, id).await? {
        Some(document) => document,
        None => {
            eprintln!("Error: document not found: {}", id);
            std::process::exit(1);
        }
    };

    println!("--- Document ---");
    println!("id:           {}", document.id);
    println!("title:        {}", document.title);
    println!("source:       {}", document.source);
    println!("source_id:    {}", document.source_id);
    if let Some(ref url) = document.url {
        println!("url:          {}", url);
    }
    if !document.authors.is_empty() {
        println!("authors:      {}", document.authors.join(", "));
    }
    if let Some(published) = document.published_at {
        println!("published_at: {}", published.to_rfc3339());
    }
    println!("added_at:     {}", document.added_at.to_rfc3339());
    if !document.topics.is_empty() {
        println!("topics:       {}", document.topics.join(", "));
    }
    if !document.risk_areas.is_empty() {
        println!("risk_areas:   {}", document.risk_areas.join(", "));
    }
    if let Some(ref checksum) = document.checksum {
        println!("checksum:     {}", checksum);
    }
    println!("version:      {}", document.version);

    let chunks = retrieval::get_chunks_for_document(store, id).await?;
    println!();
    println!("--- Chunks ({}) ---", chunks.len());
    for chunk in &chunks {
        let embedded = if chunk.embedding.is_some() {
            "embedded"
        } else {
            "pending"
        };
        println!("[chunk {} — {}]", chunk.chunk_index, embedded);
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}
