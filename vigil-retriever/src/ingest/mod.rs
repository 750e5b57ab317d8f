//! Streaming ingestion: feed sources, change watching, and the pipeline
//! that turns raw feed entries into indexed records.

pub mod pipeline;
pub mod source;
pub mod watcher;

pub use pipeline::{IngestPipeline, IngestStats, IngestStatsHandle, PipelineConfig};
pub use source::{CsvFeedSource, JsonlDirectorySource, RawRecord, SourceBatch, SourceCursor};
pub use watcher::FeedWatcher;
