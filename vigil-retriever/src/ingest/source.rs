//! Feed sources: where raw report entries come from.
//!
//! A [`SourceCursor`] abstracts "an append-only stream of raw records" so
//! the pipeline logic is identical whether the feed is a directory of JSONL
//! files, a single growing CSV table, or something else entirely (a message
//! queue cursor would implement the same trait). Cursors remember how far
//! they have read and only ever hand back newly appended entries.
//!
//! Record ids are derived from the raw line bytes (blake3), so a cursor that
//! loses its position and re-reads a feed produces the same ids again and
//! the index's duplicate policy absorbs the replay.

use crate::error::IngestError;
use crate::retrieval::record_index::RecordId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A raw feed entry after normalization, before embedding.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// blake3 hash of the raw feed line this entry came from
    pub id: RecordId,
    /// Report content
    pub text: String,
    /// Provenance tag of the producing feed
    pub source: String,
    /// The producer's own timestamp string, if the feed carried one
    pub timestamp: Option<String>,
}

/// Result of one poll: the newly observed records plus how many entries
/// were malformed and skipped.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub records: Vec<RawRecord>,
    pub malformed: usize,
}

/// A cursor over an append-only input stream.
///
/// `poll` returns entries appended since the previous call, never
/// re-delivering an entry the cursor has already consumed. A single
/// malformed entry is counted and skipped, never an error; `poll` only
/// fails when the feed itself cannot be read.
#[async_trait]
pub trait SourceCursor: Send {
    async fn poll(&mut self) -> Result<SourceBatch, IngestError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

fn record_id_for_line(line: &str) -> RecordId {
    *blake3::hash(line.as_bytes()).as_bytes()
}

/// Reads newly appended bytes from `path`, returning only complete
/// (newline-terminated) lines and the new cursor offset. A partial trailing
/// line stays in the file for the next poll.
async fn read_complete_lines(path: &Path, offset: u64) -> Result<(Vec<String>, u64), IngestError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;

    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return Ok((Vec::new(), offset));
    };

    let complete = &buf[..=last_newline];
    let new_offset = offset + complete.len() as u64;

    let lines = String::from_utf8_lossy(complete)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();

    Ok((lines, new_offset))
}

/// A directory of line-delimited JSON files, each line an object with
/// string fields `text` (or `data` as a rename), `source`, and optionally
/// `timestamp`.
///
/// Tracks a byte offset per file. Files that shrink (truncation, rotation)
/// reset their cursor with a warning; the content-derived record ids keep
/// the re-read harmless.
#[derive(Debug)]
pub struct JsonlDirectorySource {
    dir: PathBuf,
    offsets: HashMap<PathBuf, u64>,
}

impl JsonlDirectorySource {
    const EXTENSIONS: [&'static str; 3] = ["jsonl", "ndjson", "json"];

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            offsets: HashMap::new(),
        }
    }

    fn parse_line(line: &str) -> Result<RawRecord, IngestError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| IngestError::malformed(format!("invalid JSON: {e}")))?;

        let text = value
            .get("text")
            .or_else(|| value.get("data"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::malformed("missing 'text' field"))?;
        if text.trim().is_empty() {
            return Err(IngestError::malformed("empty 'text' field"));
        }

        let source = value
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::malformed("missing 'source' field"))?;

        let timestamp = value
            .get("timestamp")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(RawRecord {
            id: record_id_for_line(line),
            text: text.to_string(),
            source: source.to_string(),
            timestamp,
        })
    }
}

#[async_trait]
impl SourceCursor for JsonlDirectorySource {
    async fn poll(&mut self) -> Result<SourceBatch, IngestError> {
        let mut batch = SourceBatch::default();

        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // The feed directory may appear after startup
                return Ok(batch);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let is_feed_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| Self::EXTENSIONS.contains(&ext));
            if !is_feed_file {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Failed to stat feed file {}: {}", path.display(), e);
                    continue;
                }
            };

            let offset = self.offsets.entry(path.clone()).or_insert(0);
            if metadata.len() < *offset {
                tracing::warn!(
                    "Feed file {} shrank ({} -> {} bytes), re-reading from start",
                    path.display(),
                    *offset,
                    metadata.len()
                );
                *offset = 0;
            }
            if metadata.len() == *offset {
                continue;
            }

            // A single unreadable file must not block the other feeds
            let (lines, new_offset) = match read_complete_lines(&path, *offset).await {
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!("Failed to read feed file {}: {}", path.display(), e);
                    continue;
                }
            };
            *offset = new_offset;

            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                match Self::parse_line(&line) {
                    Ok(record) => batch.records.push(record),
                    Err(e) => {
                        tracing::warn!("Skipping malformed entry in {}: {}", path.display(), e);
                        batch.malformed += 1;
                    }
                }
            }
        }

        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("jsonl-dir:{}", self.dir.display())
    }
}

/// A single tabular feed file with columns
/// `timestamp, sector|service, report, priority`.
///
/// `report` maps to the record text and `sector` (or `service`) to the
/// source tag. The header row is recognized and skipped whenever the cursor
/// is at the start of the file.
#[derive(Debug)]
pub struct CsvFeedSource {
    path: PathBuf,
    offset: u64,
}

impl CsvFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    fn is_header(fields: &[String]) -> bool {
        fields
            .first()
            .is_some_and(|f| f.eq_ignore_ascii_case("timestamp"))
    }

    fn parse_line(line: &str) -> Result<RawRecord, IngestError> {
        let fields = split_csv_line(line);
        if fields.len() < 3 {
            return Err(IngestError::malformed(format!(
                "expected at least 3 columns, got {}",
                fields.len()
            )));
        }

        let timestamp = fields[0].trim();
        let sector = fields[1].trim();
        let report = fields[2].trim();
        if report.is_empty() {
            return Err(IngestError::malformed("empty 'report' column"));
        }
        if sector.is_empty() {
            return Err(IngestError::malformed("empty 'sector' column"));
        }

        Ok(RawRecord {
            id: record_id_for_line(line),
            text: report.to_string(),
            source: sector.to_string(),
            timestamp: (!timestamp.is_empty()).then(|| timestamp.to_string()),
        })
    }
}

#[async_trait]
impl SourceCursor for CsvFeedSource {
    async fn poll(&mut self) -> Result<SourceBatch, IngestError> {
        let mut batch = SourceBatch::default();

        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(batch),
            Err(e) => return Err(e.into()),
        };

        if metadata.len() < self.offset {
            tracing::warn!(
                "Feed file {} shrank, re-reading from start",
                self.path.display()
            );
            self.offset = 0;
        }
        if metadata.len() == self.offset {
            return Ok(batch);
        }

        let at_start = self.offset == 0;
        let (lines, new_offset) = read_complete_lines(&self.path, self.offset).await?;
        self.offset = new_offset;

        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if at_start && i == 0 && Self::is_header(&split_csv_line(line)) {
                continue;
            }
            match Self::parse_line(line) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed row in {}: {}", self.path.display(), e);
                    batch.malformed += 1;
                }
            }
        }

        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// embedded commas and doubled-quote escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
