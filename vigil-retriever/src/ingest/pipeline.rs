//! The ingestion pipeline: feed sources in, indexed records out.
//!
//! Each cycle polls every source cursor for newly appended entries,
//! normalizes them into [`DocumentRecord`]s, embeds them, and inserts them
//! into the vector index. Embedding runs through a bounded-concurrency
//! stream so ingestion throughput is not serialized on model latency;
//! insertion stays sequential (the index has a single logical writer).
//!
//! Nothing on this path is fatal. Malformed entries, duplicate replays,
//! and embedding failures are counted, logged, and skipped; the loop only
//! ends when the shutdown channel fires, and it runs one final drain so a
//! record that was embedded is never lost on the way out.

use crate::error::{IndexError, IngestError};
use crate::ingest::source::SourceCursor;
use crate::retrieval::record_index::DocumentRecord;
use crate::storage::VectorIndex;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, error, info, warn};
use vigil_embed::EmbeddingProvider;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fallback poll interval when no watcher nudge arrives.
    pub poll_interval: Duration,
    /// Concurrent in-flight embedding calls per drain.
    pub embed_workers: usize,
    /// Retries for a failed embedding before the record is dropped.
    pub max_embed_retries: u32,
    /// Base backoff between embedding retries (grows linearly).
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            embed_workers: 4,
            max_embed_retries: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl PipelineConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_embed_workers(mut self, workers: usize) -> Self {
        self.embed_workers = workers.max(1);
        self
    }

    pub fn with_max_embed_retries(mut self, retries: u32) -> Self {
        self.max_embed_retries = retries;
        self
    }
}

/// Running totals for the ingestion session.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub records_indexed: usize,
    pub duplicates_skipped: usize,
    pub malformed_skipped: usize,
    pub embed_failures: usize,
    pub index_errors: usize,
    pub source_errors: usize,
}

/// Cloneable handle for reading pipeline statistics from outside the loop.
#[derive(Debug, Clone, Default)]
pub struct IngestStatsHandle(Arc<RwLock<IngestStats>>);

impl IngestStatsHandle {
    pub async fn snapshot(&self) -> IngestStats {
        self.0.read().await.clone()
    }
}

/// The streaming ingestion pipeline.
///
/// Owns its source cursors; shares the embedder and index with the query
/// side through `Arc`s (all collaborators are injected, never global).
pub struct IngestPipeline {
    sources: Vec<Box<dyn SourceCursor>>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: PipelineConfig,
    stats: IngestStatsHandle,
    wake_rx: Option<mpsc::Receiver<()>>,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sources: Vec::new(),
            embedder,
            index,
            config,
            stats: IngestStatsHandle::default(),
            wake_rx: None,
        }
    }

    /// Add a feed source to the pipeline.
    pub fn with_source(mut self, source: Box<dyn SourceCursor>) -> Self {
        info!("Ingesting from {}", source.describe());
        self.sources.push(source);
        self
    }

    /// Attach a wake-up channel (fed by a [`FeedWatcher`](super::watcher::FeedWatcher))
    /// so feed changes are picked up ahead of the poll interval.
    pub fn with_waker(mut self, wake_rx: mpsc::Receiver<()>) -> Self {
        self.wake_rx = Some(wake_rx);
        self
    }

    /// Handle for reading ingestion statistics while the pipeline runs.
    pub fn stats_handle(&self) -> IngestStatsHandle {
        self.stats.clone()
    }

    /// Poll every source once and index whatever arrived. Returns the
    /// number of records indexed by this drain.
    ///
    /// Public so tests (and callers that manage their own scheduling) can
    /// drive the pipeline deterministically.
    pub async fn drain_once(&mut self) -> usize {
        let mut indexed_total = 0;

        for i in 0..self.sources.len() {
            let batch = match self.sources[i].poll().await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to poll {}: {}", self.sources[i].describe(), e);
                    self.stats.0.write().await.source_errors += 1;
                    continue;
                }
            };

            if batch.malformed > 0 {
                self.stats.0.write().await.malformed_skipped += batch.malformed;
            }
            if batch.records.is_empty() {
                continue;
            }
            debug!(
                "Observed {} new records from {}",
                batch.records.len(),
                self.sources[i].describe()
            );

            // Embed concurrently; completions come back in submission order
            // so insertion preserves feed order.
            let max_retries = self.config.max_embed_retries;
            let backoff = self.config.retry_backoff;
            let mut embedded = stream::iter(batch.records)
                .map(|raw| {
                    let embedder = Arc::clone(&self.embedder);
                    async move {
                        let result =
                            embed_with_retry(embedder.as_ref(), &raw.text, max_retries, backoff)
                                .await;
                        (raw, result)
                    }
                })
                .buffered(self.config.embed_workers.max(1));

            while let Some((raw, result)) = embedded.next().await {
                let embedding = match result {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        error!("Dropping record after exhausted embed retries: {}", e);
                        self.stats.0.write().await.embed_failures += 1;
                        continue;
                    }
                };

                let record = DocumentRecord {
                    id: raw.id,
                    seq: None,
                    text: raw.text,
                    source: raw.source,
                    feed_timestamp: raw.timestamp,
                    observed_at: chrono::Utc::now().timestamp(),
                    embedding,
                };

                match self.index.insert(record).await {
                    Ok(()) => {
                        indexed_total += 1;
                        self.stats.0.write().await.records_indexed += 1;
                    }
                    Err(IndexError::DuplicateRecord { id }) => {
                        debug!("Skipping already-indexed record {}", hex::encode(&id[..8]));
                        self.stats.0.write().await.duplicates_skipped += 1;
                    }
                    Err(e) => {
                        error!("Failed to index record: {}", e);
                        self.stats.0.write().await.index_errors += 1;
                    }
                }
            }
        }

        indexed_total
    }

    /// Run the pipeline until `shutdown` flips to true.
    ///
    /// Cycles are triggered by watcher nudges or the fallback interval,
    /// whichever fires first. On shutdown one final drain runs so entries
    /// observed before the signal still reach the index.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Ingest pipeline started with {} source(s), polling every {:?}",
            self.sources.len(),
            self.config.poll_interval
        );

        let mut wake_rx = self.wake_rx.take();
        loop {
            self.drain_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                nudge = recv_or_pending(&mut wake_rx) => {
                    if nudge.is_none() {
                        // Watcher dropped; fall back to pure interval polling
                        wake_rx = None;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        break;
                    }
                }
            }
        }

        let drained = self.drain_once().await;
        if drained > 0 {
            info!("Final drain indexed {} records", drained);
        }
        info!("Ingest pipeline stopped: {:?}", self.stats.snapshot().await);
        Ok(())
    }
}

/// Receive from an optional channel, pending forever when there is none so
/// the select arm simply never fires.
async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Embed one text, retrying with linear backoff up to `max_retries` before
/// giving up so a single bad record never stalls the pipeline.
async fn embed_with_retry(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    max_retries: u32,
    backoff: Duration,
) -> Result<Vec<half::f16>, IngestError> {
    let mut attempt: u32 = 0;
    loop {
        match embedder.embed_text(text).await {
            Ok(embedding) => return Ok(embedding),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    "Embedding attempt {}/{} failed, retrying: {}",
                    attempt, max_retries, e
                );
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
