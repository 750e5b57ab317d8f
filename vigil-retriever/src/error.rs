//! Error types for the index and ingestion layers.

use crate::retrieval::record_index::RecordId;

/// Errors raised by the vector index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A record with this id is already indexed. Insertion policy is to
    /// reject the second insert; callers that replay a feed treat this as
    /// a skip.
    #[error("record {} is already indexed", hex::encode(id))]
    DuplicateRecord { id: RecordId },

    /// Embedding dimension does not match the index's configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A record arrived without an embedding vector.
    #[error("record {} has an empty embedding", hex::encode(id))]
    EmptyEmbedding { id: RecordId },

    /// The index on disk was built with a different embedding model.
    #[error("index was built with model '{stored}', but '{configured}' is configured")]
    ModelMismatch { stored: String, configured: String },

    /// Underlying database failure.
    #[error("database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },
}

/// Errors raised while observing and normalizing feed input.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A feed entry is missing required fields or is not parseable. These
    /// are logged and skipped; they never stop the pipeline.
    #[error("malformed record: {reason}")]
    Malformed { reason: String },

    /// The feed itself could not be read.
    #[error("source error: {source}")]
    Source {
        #[from]
        source: std::io::Error,
    },

    /// Embedding generation failed after retries were exhausted.
    #[error("embedding failure: {source}")]
    Embedding {
        #[from]
        source: vigil_embed::EmbedError,
    },
}

impl IngestError {
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
