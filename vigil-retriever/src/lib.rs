//! vigil-retriever: live report indexing and retrieval.
//!
//! This crate is the core of the vigil engine: it continuously ingests
//! textual reports from append-only feeds, embeds them, and maintains a
//! queryable similarity index that answers k-nearest-neighbor searches
//! while new reports keep arriving.
//!
//! ## Key modules
//!
//! - **[`ingest`]**: feed cursors, the filesystem watcher, and the
//!   ingestion pipeline
//! - **[`retrieval`]**: document records and the SQLite record store
//! - **[`storage`]**: the [`VectorIndex`](storage::VectorIndex) capability
//!   and its brute-force SQLite implementation
//!
//! ## Architecture
//!
//! ```text
//! Feeds (JSONL dir / CSV) → SourceCursor → IngestPipeline → Embedder
//!        ↑                                      │
//!   FeedWatcher                                 ▼
//!                                    VectorIndex ◀── search (query side)
//! ```
//!
//! The index is the only shared mutable state: one pipeline writer, many
//! concurrent searchers. Once `insert` returns, every subsequent search
//! observes the record; a search never sees a half-inserted one.

pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod storage;

pub use error::{IndexError, IngestError};
