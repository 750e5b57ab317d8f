//! Configuration for embedding providers.

use serde::{Deserialize, Serialize};

/// Configuration for an embedding provider.
///
/// The defaults select the built-in MiniLM sentence embedding model, which is
/// small enough to run on CPU while the ingestion pipeline keeps up with a
/// live feed. Use the builder methods to adjust batching behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Human-readable model identifier, recorded in the index metadata so a
    /// mismatched index/embedder pairing is caught at startup.
    pub model_name: String,
    /// Number of texts embedded per blocking model call.
    pub batch_size: usize,
    /// Whether vectors are L2-normalized before being handed out.
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-MiniLM-L6-v2".to_string(),
            batch_size: 16,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the named model with default batching.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the number of texts per model invocation.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Enable or disable L2 normalization of output vectors.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}
