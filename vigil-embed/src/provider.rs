//! Embedding provider implementations.
//!
//! An [`EmbeddingProvider`] turns text into fixed-length `f16` vectors. Two
//! implementations live here:
//!
//! - [`FastEmbedProvider`]: a real sentence-embedding model run locally
//!   through ONNX. This is the production provider.
//! - [`HashEmbedProvider`]: a deterministic feature-hashing stub with no
//!   model at all. Useful for tests and for running the engine offline;
//!   identical text always produces the identical vector, which is the only
//!   property retrieval tests rely on.
//!
//! Providers are constructed once and passed to consumers explicitly; there
//! is no process-global model registry.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;
use std::sync::{Arc, Mutex};

/// Result of embedding generation.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result from a vector of f16 embeddings. The dimension is
    /// inferred from the first embedding; an empty input yields dimension 0.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations must be semantically deterministic: repeated calls with
/// the same text must produce vectors that are equivalent for retrieval
/// purposes. Empty strings must embed to a valid (possibly degenerate)
/// vector rather than failing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing).
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of the vectors produced by this provider.
    fn embedding_dimension(&self) -> usize;

    /// Name/identifier of this provider's model.
    fn model_name(&self) -> &str;
}

/// FastEmbed-based embedding provider using a local ONNX model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load the embedding model and probe its dimension.
    ///
    /// Model loading runs on a blocking thread since ONNX initialization can
    /// take seconds. The returned provider is fully initialized; cloning it
    /// shares the underlying model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        tracing::info!("Loading embedding model: {}", config.model_name);

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options =
                    InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::External { source: e })?;

                // Probe the dimension with a test embedding
                let test_embeddings = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(|e| EmbedError::External { source: e })?;
                let dimension = test_embeddings.first().map(|emb| emb.len()).unwrap_or(384);

                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Model loaded successfully. Dimension: {}", dimension);

        let provider = Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        };
        provider.validate_model().await?;
        Ok(provider)
    }

    /// Validate that the model produces sane output.
    async fn validate_model(&self) -> Result<()> {
        let embedding = self.embed_batch_f32(vec!["validation test".to_string()]).await?;
        let embedding = embedding
            .first()
            .ok_or_else(|| EmbedError::invalid_config("Model validation failed: no embedding"))?;

        if embedding.is_empty() {
            return Err(EmbedError::invalid_config(
                "Model validation failed: empty embedding",
            ));
        }
        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "Model validation failed: expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if embedding.iter().any(|value| !value.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name);
        Ok(())
    }

    /// Run one batch through the model on a blocking thread.
    async fn embed_batch_f32(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model.lock().unwrap();
            guard
                .embed(texts, None)
                .map_err(|e| EmbedError::External { source: e })
        })
        .await?
    }

    /// Convert f32 embeddings to f16, normalizing if configured.
    fn convert_to_f16(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                if self.config.normalize {
                    normalize_f32_to_f16(&embedding)
                } else {
                    embedding.into_iter().map(f16::from_f32).collect()
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size) {
            let batch = self.embed_batch_f32(chunk.to_vec()).await?;
            all_embeddings.extend(self.convert_to_f16(batch));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Deterministic hash-based embedding provider.
///
/// Feature-hashes tokens into a fixed number of buckets with FNV, signing
/// each contribution off a hash bit, then L2-normalizes. Texts that share
/// tokens land near each other, identical texts collide exactly, and the
/// empty string maps to the zero vector. Not semantically meaningful, but
/// deterministic and dependency-free, which is what tests need.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
}

impl HashEmbedProvider {
    pub const MODEL_NAME: &'static str = "feature-hash";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }
        normalize_f32_to_f16(&buckets)
    }
}

impl Default for HashEmbedProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed_one(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_one(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

/// L2-normalize an f32 vector and convert it to f16. A zero vector stays
/// zero rather than dividing by a zero norm.
fn normalize_f32_to_f16(values: &[f32]) -> Vec<f16> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| f16::from_f32(x / norm)).collect()
    } else {
        values.iter().map(|x| f16::from_f32(*x)).collect()
    }
}
