//! # vigil-embed
//!
//! Text embedding providers for the vigil retrieval engine, with a focus on
//! local ONNX models via FastEmbed. Designed for async operation with a
//! clean provider trait so the rest of the engine never cares which model
//! (or stub) is behind it.
//!
//! ## Features
//!
//! - **Local ONNX models**: embeddings run on CPU with no external API calls
//! - **Async-first**: model calls are dispatched to blocking threads, the
//!   public API is fully async
//! - **Half-precision**: `f16` vectors to halve index memory and storage
//! - **Deterministic stub**: [`HashEmbedProvider`] for tests and offline use
//!
//! ## Quick start
//!
//! ```no_run
//! use vigil_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> vigil_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//! let vector = provider.embed_text("UAV airspace violation reported").await?;
//! assert_eq!(vector.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! Providers are explicitly constructed and passed by handle; there is no
//! global model cache or hidden initialization order.

pub mod config;
pub mod error;
pub mod provider;

pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, HashEmbedProvider};
