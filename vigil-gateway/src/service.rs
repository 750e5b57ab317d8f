//! The query service: validate, embed, search, optionally compose.
//!
//! This is the retrieval contract the HTTP layer exposes. All collaborators
//! (embedder, index, composer) are injected; the service itself holds no
//! mutable state and is shared behind an `Arc` by every request handler.

use crate::composer::AnswerComposer;
use crate::error::GatewayError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use vigil_embed::EmbeddingProvider;
use vigil_retriever::storage::VectorIndex;

/// One retrieved document as returned to callers. Embeddings never appear
/// here; callers get text, provenance, and the similarity score only.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Retrieval result plus the optional composed answer. `answer` is `None`
/// whenever composition is disabled, fails, or times out; `results` is
/// always populated so callers can degrade gracefully.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedAnswer {
    pub answer: Option<String>,
    pub results: Vec<RetrievedDocument>,
}

pub struct QueryService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    composer: Option<Arc<dyn AnswerComposer>>,
    composer_timeout: Duration,
}

impl QueryService {
    /// Composition gets most of the endpoint's 8 second budget, leaving
    /// headroom for embedding and the index scan.
    pub const DEFAULT_COMPOSER_TIMEOUT: Duration = Duration::from_secs(6);

    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            composer: None,
            composer_timeout: Self::DEFAULT_COMPOSER_TIMEOUT,
        }
    }

    /// Enable best-effort answer composition.
    pub fn with_composer(mut self, composer: Arc<dyn AnswerComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_composer_timeout(mut self, timeout: Duration) -> Self {
        self.composer_timeout = timeout;
        self
    }

    /// Embed `query` and return its `k` nearest documents.
    ///
    /// `k == 0` and blank queries are rejected with
    /// [`GatewayError::InvalidArgument`]. A failing index degrades to an
    /// empty result (with a warning) instead of an error, so callers that
    /// race a cold-starting pipeline are not broken.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, GatewayError> {
        if k == 0 {
            return Err(GatewayError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(GatewayError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }

        let vector = self.embedder.embed_text(query).await?;

        let hits = match self.index.search(&vector, k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Index unavailable, returning empty result: {}", e);
                Vec::new()
            }
        };

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                text: hit.text,
                source: hit.source,
                score: hit.score,
            })
            .collect())
    }

    /// Retrieve, then ask the composer (when configured) for a natural-
    /// language answer over the retrieved texts. Composition is bounded by
    /// the configured timeout and strictly best-effort.
    pub async fn answer(&self, query: &str, k: usize) -> Result<ComposedAnswer, GatewayError> {
        let results = self.retrieve(query, k).await?;

        let answer = match &self.composer {
            Some(composer) => {
                match tokio::time::timeout(self.composer_timeout, composer.compose(query, &results))
                    .await
                {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(e)) => {
                        warn!("Answer composition failed, returning raw retrieval: {}", e);
                        None
                    }
                    Err(_) => {
                        warn!(
                            "Answer composition timed out after {:?}, returning raw retrieval",
                            self.composer_timeout
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(ComposedAnswer { answer, results })
    }

    /// Number of indexed records, for health reporting. A failing index
    /// reads as zero rather than failing the health check.
    pub async fn record_count(&self) -> usize {
        self.index.count().await.unwrap_or(0)
    }
}
