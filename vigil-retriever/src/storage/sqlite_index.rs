//! SQLite implementation of the vector index.
//!
//! Wraps [`RecordIndex`] with the index semantics: duplicate-id rejection,
//! embedding validation, and brute-force cosine similarity search. The
//! linear scan is O(N·D) per query, which is the correct baseline for this
//! corpus size; swapping in an approximate index only requires honoring the
//! same ordering contract.
//!
//! Snapshot consistency comes from SQLite itself: inserts are single-
//! statement transactions and WAL-mode readers see only committed rows, so
//! a search can never observe a record without its embedding.

use super::{SearchHit, VectorIndex};
use crate::error::IndexError;
use crate::retrieval::record_index::{DocumentRecord, RecordIndex};
use async_trait::async_trait;
use half::f16;
use std::path::Path;

/// Brute-force cosine similarity index over the SQLite record corpus.
#[derive(Clone, Debug)]
pub struct SqliteVectorIndex {
    records: RecordIndex,
    dimension: usize,
}

impl SqliteVectorIndex {
    /// Open (or create) a persistent index under `base`, pinned to the
    /// given embedding model.
    ///
    /// If the index already holds records from a different model the open
    /// fails with [`IndexError::ModelMismatch`] rather than silently mixing
    /// incomparable vector spaces.
    pub async fn open(base: &Path, model_name: &str, dimension: usize) -> Result<Self, IndexError> {
        let records = RecordIndex::open(base).await?;
        Self::with_record_index(records, model_name, dimension).await
    }

    /// In-memory index for tests.
    pub async fn open_memory(model_name: &str, dimension: usize) -> Result<Self, IndexError> {
        let records = RecordIndex::open_memory().await?;
        Self::with_record_index(records, model_name, dimension).await
    }

    async fn with_record_index(
        records: RecordIndex,
        model_name: &str,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        match records.model_metadata().await? {
            Some((stored, stored_dim)) => {
                if stored != model_name || stored_dim != dimension {
                    return Err(IndexError::ModelMismatch {
                        stored: format!("{stored} ({stored_dim}d)"),
                        configured: format!("{model_name} ({dimension}d)"),
                    });
                }
            }
            None => records.register_model(model_name, dimension).await?,
        }

        Ok(Self { records, dimension })
    }

    /// The low-level record store, for callers that need raw corpus access.
    pub fn record_index(&self) -> &RecordIndex {
        &self.records
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert(&self, record: DocumentRecord) -> Result<(), IndexError> {
        if record.embedding.is_empty() {
            return Err(IndexError::EmptyEmbedding { id: record.id });
        }
        if record.embedding.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: record.embedding.len(),
            });
        }

        let seq = self.records.insert_record(&record).await?;
        tracing::debug!(
            "Indexed record {} from '{}' as seq {}",
            hex::encode(&record.id[..8]),
            record.source,
            seq
        );
        Ok(())
    }

    async fn search(&self, query: &[f16], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.all_records().await?;

        let mut scored: Vec<(f32, i64, DocumentRecord)> = records
            .into_iter()
            .map(|record| {
                let score = cosine_similarity(query, &record.embedding);
                let seq = record.seq.unwrap_or(i64::MAX);
                (score, seq, record)
            })
            .collect();

        // Descending by similarity; ties go to the earliest-inserted record
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, _, record)| SearchHit {
                text: record.text,
                source: record.source,
                observed_at: record.observed_at,
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        self.records.count().await
    }
}

/// Cosine similarity between two f16 vectors, accumulated in f32.
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_f16(values: &[f32]) -> Vec<f16> {
        values.iter().map(|&v| f16::from_f32(v)).collect()
    }

    fn record(id_byte: u8, text: &str, embedding: &[f32]) -> DocumentRecord {
        DocumentRecord {
            id: [id_byte; 32],
            seq: None,
            text: text.to_string(),
            source: "SAT".to_string(),
            feed_timestamp: None,
            observed_at: 1_700_000_000,
            embedding: vec_f16(embedding),
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_results() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 3).await?;
        let hits = index.search(&vec_f16(&[1.0, 0.0, 0.0]), 5).await?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn nearest_neighbor_ordering() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 3).await?;

        index.insert(record(1, "east", &[1.0, 0.0, 0.0])).await?;
        index.insert(record(2, "north", &[0.0, 1.0, 0.0])).await?;
        index.insert(record(3, "northeast", &[0.7, 0.7, 0.0])).await?;

        let hits = index.search(&vec_f16(&[1.0, 0.0, 0.0]), 3).await?;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "northeast");
        assert_eq!(hits[2].text, "north");

        // Scores are non-increasing
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn k_caps_at_corpus_size() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 2).await?;
        index.insert(record(1, "only", &[1.0, 0.0])).await?;

        let hits = index.search(&vec_f16(&[1.0, 0.0]), 10).await?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 2).await?;

        // Identical embeddings but distinct ids: equal similarity to any query
        index.insert(record(1, "first", &[1.0, 0.0])).await?;
        index.insert(record(2, "second", &[1.0, 0.0])).await?;

        let hits = index.search(&vec_f16(&[1.0, 0.0]), 2).await?;
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[1].text, "second");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_insert_keeps_result_set_stable() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 2).await?;

        index.insert(record(1, "report", &[1.0, 0.0])).await?;
        let err = index.insert(record(1, "report", &[1.0, 0.0])).await;
        assert!(matches!(err, Err(IndexError::DuplicateRecord { .. })));

        // A saturating query still sees exactly one copy
        let hits = index.search(&vec_f16(&[1.0, 0.0]), 10).await?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 3).await?;

        let err = index.insert(record(1, "short", &[1.0, 0.0])).await;
        assert!(matches!(
            err,
            Err(IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));

        let err = index.search(&vec_f16(&[1.0, 0.0]), 1).await;
        assert!(matches!(err, Err(IndexError::DimensionMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn empty_embedding_is_rejected() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 3).await?;
        let err = index.insert(record(1, "no vector", &[])).await;
        assert!(matches!(err, Err(IndexError::EmptyEmbedding { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn hits_do_not_expose_embeddings() -> Result<(), IndexError> {
        let index = SqliteVectorIndex::open_memory("test-model", 2).await?;
        index.insert(record(1, "classified", &[1.0, 0.0])).await?;

        let hits = index.search(&vec_f16(&[1.0, 0.0]), 1).await?;
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["text"], "classified");
        Ok(())
    }

    #[tokio::test]
    async fn model_mismatch_detected_on_reopen() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        {
            let _index = SqliteVectorIndex::open(temp_dir.path(), "model-a", 3).await?;
        }
        let err = SqliteVectorIndex::open(temp_dir.path(), "model-b", 3).await;
        assert!(matches!(err, Err(IndexError::ModelMismatch { .. })));
        Ok(())
    }

    #[test]
    fn cosine_similarity_basics() {
        let a = vec_f16(&[1.0, 0.0]);
        let b = vec_f16(&[0.0, 1.0]);
        let c = vec_f16(&[1.0, 0.0]);

        assert!((cosine_similarity(&a, &b)).abs() < f32::EPSILON);
        assert!((cosine_similarity(&a, &c) - 1.0).abs() < 1e-3);
        assert_eq!(cosine_similarity(&a, &vec_f16(&[0.0, 0.0])), 0.0);
        assert_eq!(cosine_similarity(&a, &vec_f16(&[1.0])), 0.0);
    }
}
