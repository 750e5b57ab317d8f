//! Core SQLite database operations for document record storage.
//!
//! This module provides the foundational data layer for vigil-retriever,
//! implementing direct SQLite operations for storing ingested report records
//! and their embeddings.
//!
//! ## Key Components
//!
//! - **RecordIndex**: Main database interface with optimized SQLite configuration
//! - **DocumentRecord**: A normalized report with provenance and its embedding
//!
//! ## Database Schema
//!
//! ```sql
//! -- Records table: the append-only corpus. rowid doubles as the
//! -- insertion sequence used for stable tie-breaking in search results.
//! CREATE TABLE records (
//!     id BLOB PRIMARY KEY,             -- blake3 hash of the raw feed line (32 bytes)
//!     text TEXT NOT NULL,              -- normalized report content
//!     source TEXT NOT NULL,            -- provenance tag of the producing feed
//!     feed_timestamp TEXT,             -- the producer's own timestamp, if any
//!     observed_at INTEGER NOT NULL,    -- ingestion time (unix seconds)
//!     embedding BLOB NOT NULL          -- f16 embedding vector
//! );
//!
//! -- Index metadata: which embedding model produced the vectors
//! CREATE TABLE index_meta (
//!     model_name TEXT NOT NULL,
//!     dimension INTEGER NOT NULL,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! ## SQLite Optimizations
//!
//! - **WAL mode**: queries keep running against a committed snapshot while
//!   the single ingestion writer appends
//! - **Large page size** (64KB): embedding blobs dominate row size
//! - **Busy timeout**: writers wait instead of erroring under contention

use crate::error::IndexError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Opaque record identifier: blake3 hash of the raw feed entry (32 bytes).
///
/// Being content-derived, ids are stable across feed replays: re-reading an
/// already-ingested line reproduces the same id and is rejected as a
/// duplicate instead of growing the corpus.
pub type RecordId = [u8; 32];

/// A normalized, embedded report record.
///
/// Records are immutable once inserted and never deleted; the corpus only
/// grows. `seq` is assigned by the database at insertion and records the
/// arrival order (used only for stable tie-breaking in search results).
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Content-derived unique identifier, assigned at ingestion
    pub id: RecordId,
    /// Insertion sequence (None until the record has been inserted)
    pub seq: Option<i64>,
    /// The raw report content
    pub text: String,
    /// Provenance tag of the producing feed
    pub source: String,
    /// The producer's own timestamp string, when the feed carried one
    pub feed_timestamp: Option<String>,
    /// Ingestion-observed time, unix seconds, assigned by the pipeline
    pub observed_at: i64,
    /// Embedding vector, computed once from `text`
    pub embedding: Vec<half::f16>,
}

/// SQLite-backed storage for the record corpus.
///
/// `RecordIndex` provides the low-level database operations; the searchable
/// index semantics (duplicate policy, similarity search) live in
/// [`SqliteVectorIndex`](crate::storage::sqlite_index::SqliteVectorIndex),
/// which wraps this type.
#[derive(Clone, Debug)]
pub struct RecordIndex {
    pool: SqlitePool,
}

impl RecordIndex {
    /// Database file name created inside the index directory.
    pub const DB_FILE: &'static str = ".vigil.db";

    /// Opens the record index with persistent SQLite storage under `base`.
    pub async fn open(base: &Path) -> Result<Self, IndexError> {
        let db_path = base.join(Self::DB_FILE);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true)
                .page_size(1 << 16),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Opens an in-memory record index for testing. The pool is pinned to a
    /// single connection so every statement sees the same database.
    pub async fn open_memory() -> Result<Self, IndexError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id BLOB PRIMARY KEY,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                feed_timestamp TEXT,
                observed_at INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                model_name TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_observed ON records(observed_at)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a record. Returns the assigned insertion sequence.
    ///
    /// A second insert with the same id violates the primary key and is
    /// surfaced as [`IndexError::DuplicateRecord`]; the stored record is
    /// left untouched.
    pub async fn insert_record(&self, record: &DocumentRecord) -> Result<i64, IndexError> {
        let embedding_bytes = bytemuck::cast_slice::<half::f16, u8>(&record.embedding);

        let result = sqlx::query(
            r#"
            INSERT INTO records (id, text, source, feed_timestamp, observed_at, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id[..])
        .bind(&record.text)
        .bind(&record.source)
        .bind(&record.feed_timestamp)
        .bind(record.observed_at)
        .bind(embedding_bytes)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(IndexError::DuplicateRecord { id: record.id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch every record with its embedding, in insertion order.
    pub async fn all_records(&self) -> Result<Vec<DocumentRecord>, IndexError> {
        let rows = sqlx::query(
            "SELECT rowid, id, text, source, feed_timestamp, observed_at, embedding
             FROM records ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let seq: i64 = row.get("rowid");
            let id_bytes: Vec<u8> = row.get("id");
            let text: String = row.get("text");
            let source: String = row.get("source");
            let feed_timestamp: Option<String> = row.get("feed_timestamp");
            let observed_at: i64 = row.get("observed_at");
            let embedding_bytes: Vec<u8> = row.get("embedding");

            let mut id = [0u8; 32];
            id.copy_from_slice(&id_bytes[..32]);

            // pod_collect copies, so the blob's alignment never matters
            records.push(DocumentRecord {
                id,
                seq: Some(seq),
                text,
                source,
                feed_timestamp,
                observed_at,
                embedding: bytemuck::pod_collect_to_vec::<u8, half::f16>(&embedding_bytes),
            });
        }
        Ok(records)
    }

    /// Number of records in the corpus.
    pub async fn count(&self) -> Result<usize, IndexError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Record which embedding model this index was built with.
    pub async fn register_model(&self, model_name: &str, dimension: usize) -> Result<(), IndexError> {
        sqlx::query("INSERT INTO index_meta (model_name, dimension) VALUES (?1, ?2)")
            .bind(model_name)
            .bind(dimension as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The registered embedding model, if any.
    pub async fn model_metadata(&self) -> Result<Option<(String, usize)>, IndexError> {
        let row = sqlx::query(
            "SELECT model_name, dimension FROM index_meta ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let model_name: String = row.get("model_name");
            let dimension: i64 = row.get("dimension");
            (model_name, dimension as usize)
        }))
    }
}
