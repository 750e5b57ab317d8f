//! vigil-gateway: the HTTP query surface of the vigil engine.
//!
//! Exposes the retrieval API over axum — `POST /v1/retrieve` for raw
//! k-nearest-neighbor retrieval, `POST /v1/answer` for retrieval plus an
//! optional LLM-composed answer, and `GET /health` — and ships the binary
//! that wires the whole engine together: index, embedder, ingestion
//! pipeline, feed watcher, and this server.
//!
//! The query path is: validate → embed the query → search the shared
//! [`VectorIndex`](vigil_retriever::storage::VectorIndex) → return
//! `{text, source, score}` tuples. Answer composition is best-effort and
//! bounded by a timeout; callers always receive the raw retrieval result.

pub mod composer;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod service;

pub use error::GatewayError;
pub use router::build_router;
pub use server::{AppState, GatewayServer};
pub use service::{ComposedAnswer, QueryService, RetrievedDocument};
