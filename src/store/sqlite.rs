//! SQLite [`Store`] implementation backed by sqlx.
//!
//! Label sets and metadata are stored as JSON text columns and filtered
//! with `json_each`; embedding vectors are little-endian f32 BLOBs.
//! Timestamps are Unix epoch seconds.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, Document, Metadata, SearchFilters, Source};

use super::{apply_metadata_filter, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                canonical_url TEXT NOT NULL,
                ingestion_mode TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_ingested_at INTEGER,
                last_ingestion_status TEXT,
                last_error_message TEXT,
                doc_count INTEGER NOT NULL DEFAULT 0,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                external_id TEXT,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT,
                authors_json TEXT NOT NULL DEFAULT '[]',
                published_at INTEGER,
                added_at INTEGER NOT NULL,
                abstract_text TEXT,
                text TEXT,
                raw_uri TEXT,
                checksum TEXT,
                topics_json TEXT NOT NULL DEFAULT '[]',
                risk_areas_json TEXT NOT NULL DEFAULT '[]',
                tags_json TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT NOT NULL DEFAULT '{}',
                version INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB,
                topics_json TEXT NOT NULL DEFAULT '[]',
                risk_areas_json TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                UNIQUE(doc_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_published_at ON documents(published_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, kind, canonical_url, ingestion_mode, is_active,
                                 last_ingested_at, last_ingestion_status, last_error_message,
                                 doc_count, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                canonical_url = excluded.canonical_url,
                ingestion_mode = excluded.ingestion_mode,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(&source.kind)
        .bind(&source.canonical_url)
        .bind(&source.ingestion_mode)
        .bind(source.is_active)
        .bind(source.last_ingested_at.map(|ts| ts.timestamp()))
        .bind(&source.last_ingestion_status)
        .bind(&source.last_error_message)
        .bind(source.doc_count)
        .bind(encode_map(&source.metadata))
        .bind(source.created_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| source_from_row(&row)))
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    async fn find_sources_by_url(&self, url: &str) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources WHERE canonical_url = ?")
            .bind(url)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    async fn delete_sources(&self, source_ids: &[String]) -> Result<()> {
        if source_ids.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM sources WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in source_ids {
            separated.push_bind(id.clone());
        }
        builder.push(")");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn record_ingestion_status(
        &self,
        source_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources
            SET last_ingested_at = ?, last_ingestion_status = ?, last_error_message = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(status)
        .bind(error)
        .bind(Utc::now().timestamp())
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, external_id, source, source_id, title, url, authors_json,
                                   published_at, added_at, abstract_text, text, raw_uri, checksum,
                                   topics_json, risk_areas_json, tags_json, metadata_json, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                external_id = excluded.external_id,
                source = excluded.source,
                source_id = excluded.source_id,
                title = excluded.title,
                url = excluded.url,
                authors_json = excluded.authors_json,
                published_at = excluded.published_at,
                abstract_text = excluded.abstract_text,
                text = excluded.text,
                raw_uri = excluded.raw_uri,
                checksum = excluded.checksum,
                topics_json = excluded.topics_json,
                risk_areas_json = excluded.risk_areas_json,
                tags_json = excluded.tags_json,
                metadata_json = excluded.metadata_json,
                version = excluded.version
            "#,
        )
        .bind(&document.id)
        .bind(&document.external_id)
        .bind(&document.source)
        .bind(&document.source_id)
        .bind(&document.title)
        .bind(&document.url)
        .bind(encode_list(&document.authors))
        .bind(document.published_at.map(|ts| ts.timestamp()))
        .bind(document.added_at.timestamp())
        .bind(&document.abstract_text)
        .bind(&document.text)
        .bind(&document.raw_uri)
        .bind(&document.checksum)
        .bind(encode_list(&document.topics))
        .bind(encode_list(&document.risk_areas))
        .bind(encode_list(&document.tags))
        .bind(encode_map(&document.metadata))
        .bind(document.version)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now().timestamp();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, doc_id, chunk_index, text, embedding,
                                    topics_json, risk_areas_json, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .bind(encode_list(&chunk.topics))
            .bind(encode_list(&chunk.risk_areas))
            .bind(encode_map(&chunk.metadata))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE sources
            SET doc_count = (SELECT COUNT(*) FROM documents WHERE source_id = ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&document.source_id)
        .bind(now)
        .bind(&document.source_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| document_from_row(&row, "")))
    }

    async fn get_chunks_for_document(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE doc_id = ? ORDER BY chunk_index ASC")
                .bind(doc_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(|row| chunk_from_row(row, "")).collect())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT topics_json FROM documents")
            .fetch_all(&self.pool)
            .await?;

        let mut topics = std::collections::BTreeSet::new();
        for row in &rows {
            let raw: String = row.get("topics_json");
            topics.extend(decode_list(&raw));
        }
        Ok(topics.into_iter().collect())
    }

    async fn fetch_candidates(
        &self,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<(Chunk, Document)>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT \
               c.id AS c_id, c.doc_id AS c_doc_id, c.chunk_index AS c_chunk_index, \
               c.text AS c_text, c.embedding AS c_embedding, c.topics_json AS c_topics_json, \
               c.risk_areas_json AS c_risk_areas_json, c.metadata_json AS c_metadata_json, \
               d.id AS d_id, d.external_id AS d_external_id, d.source AS d_source, \
               d.source_id AS d_source_id, d.title AS d_title, d.url AS d_url, \
               d.authors_json AS d_authors_json, d.published_at AS d_published_at, \
               d.added_at AS d_added_at, d.abstract_text AS d_abstract_text, d.text AS d_text, \
               d.raw_uri AS d_raw_uri, d.checksum AS d_checksum, d.topics_json AS d_topics_json, \
               d.risk_areas_json AS d_risk_areas_json, d.tags_json AS d_tags_json, \
               d.metadata_json AS d_metadata_json, d.version AS d_version \
             FROM chunks c JOIN documents d ON d.id = c.doc_id \
             WHERE c.embedding IS NOT NULL",
        );

        if let Some(topics) = non_empty(filters.topics.as_deref()) {
            push_label_filter(&mut builder, "c.topics_json", topics);
        }
        if let Some(sources) = non_empty(filters.sources.as_deref()) {
            builder.push(" AND d.source IN (");
            let mut separated = builder.separated(", ");
            for source in sources {
                separated.push_bind(source.clone());
            }
            builder.push(")");
        }
        if let Some(risk_areas) = non_empty(filters.risk_areas.as_deref()) {
            push_label_filter(&mut builder, "c.risk_areas_json", risk_areas);
        }
        if let Some(year) = filters.year_min {
            builder.push(" AND d.published_at >= ");
            builder.push_bind(year_start_ts(year));
        }
        if let Some(year) = filters.year_max {
            builder.push(" AND d.published_at <= ");
            builder.push_bind(year_end_ts(year));
        }

        builder.push(" ORDER BY c.created_at DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut pairs: Vec<(Chunk, Document)> = rows
            .iter()
            .map(|row| (chunk_from_row(row, "c_"), document_from_row(row, "d_")))
            .collect();

        apply_metadata_filter(&mut pairs, filters);
        Ok(pairs)
    }
}

fn non_empty(labels: Option<&[String]>) -> Option<&[String]> {
    labels.filter(|l| !l.is_empty())
}

/// Any-of membership test against a JSON array column.
fn push_label_filter(builder: &mut QueryBuilder<Sqlite>, column: &str, labels: &[String]) {
    builder.push(format!(
        " AND EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value IN (",
        column
    ));
    let mut separated = builder.separated(", ");
    for label in labels {
        separated.push_bind(label.clone());
    }
    builder.push("))");
}

fn year_start_ts(year: i32) -> i64 {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap().timestamp()
}

fn year_end_ts(year: i32) -> i64 {
    Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59)
        .unwrap()
        .timestamp()
}

fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_map(metadata: &Metadata) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

fn decode_map(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn source_from_row(row: &sqlx::sqlite::SqliteRow) -> Source {
    let metadata_raw: String = row.get("metadata_json");
    Source {
        id: row.get("id"),
        name: row.get("name"),
        kind: row.get("kind"),
        canonical_url: row.get("canonical_url"),
        ingestion_mode: row.get("ingestion_mode"),
        is_active: row.get("is_active"),
        last_ingested_at: row
            .get::<Option<i64>, _>("last_ingested_at")
            .map(ts_to_datetime),
        last_ingestion_status: row.get("last_ingestion_status"),
        last_error_message: row.get("last_error_message"),
        doc_count: row.get("doc_count"),
        metadata: decode_map(&metadata_raw),
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow, prefix: &str) -> Document {
    let col = |name: &str| format!("{}{}", prefix, name);
    let authors_raw: String = row.get(col("authors_json").as_str());
    let topics_raw: String = row.get(col("topics_json").as_str());
    let risk_areas_raw: String = row.get(col("risk_areas_json").as_str());
    let tags_raw: String = row.get(col("tags_json").as_str());
    let metadata_raw: String = row.get(col("metadata_json").as_str());

    Document {
        id: row.get(col("id").as_str()),
        external_id: row.get(col("external_id").as_str()),
        source: row.get(col("source").as_str()),
        source_id: row.get(col("source_id").as_str()),
        title: row.get(col("title").as_str()),
        url: row.get(col("url").as_str()),
        authors: decode_list(&authors_raw),
        published_at: row
            .get::<Option<i64>, _>(col("published_at").as_str())
            .map(ts_to_datetime),
        added_at: ts_to_datetime(row.get(col("added_at").as_str())),
        abstract_text: row.get(col("abstract_text").as_str()),
        text: row.get(col("text").as_str()),
        raw_uri: row.get(col("raw_uri").as_str()),
        checksum: row.get(col("checksum").as_str()),
        topics: decode_list(&topics_raw),
        risk_areas: decode_list(&risk_areas_raw),
        tags: decode_list(&tags_raw),
        metadata: decode_map(&metadata_raw),
        version: row.get(col("version").as_str()),
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow, prefix: &str) -> Chunk {
    let col = |name: &str| format!("{}{}", prefix, name);
    let topics_raw: String = row.get(col("topics_json").as_str());
    let risk_areas_raw: String = row.get(col("risk_areas_json").as_str());
    let metadata_raw: String = row.get(col("metadata_json").as_str());

    Chunk {
        id: row.get(col("id").as_str()),
        doc_id: row.get(col("doc_id").as_str()),
        chunk_index: row.get(col("chunk_index").as_str()),
        text: row.get(col("text").as_str()),
        embedding: row
            .get::<Option<Vec<u8>>, _>(col("embedding").as_str())
            .map(|blob| blob_to_vec(&blob)),
        topics: decode_list(&topics_raw),
        risk_areas: decode_list(&risk_areas_raw),
        metadata: decode_map(&metadata_raw),
    }
}
