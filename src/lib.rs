//! # Safety KB
//!
//! An AI-safety knowledge base: source ingestion, chunked embeddings, and
//! filtered semantic retrieval.
//!
//! Safety KB pulls text documents from registered sources (web feeds,
//! local files, a markdown catalog), normalizes and splits them into
//! overlapping word-window chunks, embeds each chunk into vector space,
//! and serves semantic search with structured filters over the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │   Sources    │──▶│   Pipeline     │──▶│  SQLite    │
//! │ feeds/files  │   │ Chunk + Embed │   │ docs+vecs │
//! └──────────────┘   └───────────────┘   └────┬──────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐      ┌───────────┐
//!                    │   CLI    │      │ Retrieval │
//!                    │  (skb)   │      │    API    │
//!                    └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! skb init                          # create database
//! skb sync alignment-forum          # ingest a built-in source
//! skb catalog sync                  # ingest catalog links + local files
//! skb search "detecting deception" --topic alignment
//! skb topics                        # list indexed topics
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`text`] | Markup and whitespace normalization |
//! | [`chunking`] | Word-window text chunking |
//! | [`embedding`] | Embedding provider abstraction and cache |
//! | [`store`] | Storage contract + SQLite and in-memory backends |
//! | [`retrieval`] | Semantic search, ranking, and lookups |
//! | [`ingest`] | Ingestion orchestration |
//! | [`sources`] | Built-in ingestion source adapters |
//! | [`catalog`] | Markdown source catalog render and sync |

pub mod catalog;
pub mod checksum;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod sources;
pub mod store;
pub mod text;
