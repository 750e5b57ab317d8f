//! Storage abstraction for the searchable vector index.
//!
//! This module separates the index *capability* from its concrete backend:
//! the ingestion pipeline and the query service only ever see the
//! [`VectorIndex`] trait, so the brute-force SQLite implementation can be
//! swapped for an approximate index without touching either side.
//!
//! ```text
//! IngestPipeline ──insert──▶ VectorIndex ◀──search── QueryService
//!                                │
//!                        SqliteVectorIndex
//! ```

use crate::error::IndexError;
use crate::retrieval::record_index::DocumentRecord;
use async_trait::async_trait;

pub mod sqlite_index;

/// One search result: a record's retrievable fields plus its similarity to
/// the query vector. Embeddings are deliberately absent; they never travel
/// past the index boundary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    pub observed_at: i64,
    pub score: f32,
}

/// A mutable collection of embedded records supporting k-nearest-neighbor
/// retrieval, safe for concurrent use from the ingestion writer and many
/// query readers.
///
/// Similarity is cosine similarity. `insert` is a synchronization point:
/// once it returns, every subsequent `search` observes the record. A search
/// never observes a partially-inserted record.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add a record to the searchable set.
    ///
    /// Fails with [`IndexError::DuplicateRecord`] if the id is already
    /// indexed (the stored record wins), and with
    /// [`IndexError::DimensionMismatch`] / [`IndexError::EmptyEmbedding`]
    /// if the embedding does not fit the index, so that every indexed
    /// record is guaranteed a well-formed dimension-D vector.
    async fn insert(&self, record: DocumentRecord) -> Result<(), IndexError>;

    /// Return up to `k` records most similar to `query`, descending by
    /// cosine similarity, ties broken by earliest insertion.
    ///
    /// An index holding fewer than `k` records returns what it has; an
    /// empty index returns an empty result, never an error.
    async fn search(&self, query: &[half::f16], k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Number of indexed records.
    async fn count(&self) -> Result<usize, IndexError>;
}
