//! Integration tests for the ingestion pipeline and vector index working
//! together over real feed files:
//! - end-to-end ingest → embed → index → search
//! - self-retrieval of an ingested record by its exact text
//! - malformed-entry resilience
//! - restart replay idempotence
//! - concurrent search and insert traffic

use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use vigil_embed::{EmbeddingProvider, HashEmbedProvider};
use vigil_retriever::ingest::{IngestPipeline, JsonlDirectorySource, PipelineConfig};
use vigil_retriever::retrieval::record_index::DocumentRecord;
use vigil_retriever::storage::{VectorIndex, sqlite_index::SqliteVectorIndex};

const DIM: usize = 256;

async fn memory_index() -> Arc<SqliteVectorIndex> {
    Arc::new(
        SqliteVectorIndex::open_memory(HashEmbedProvider::MODEL_NAME, DIM)
            .await
            .unwrap(),
    )
}

fn pipeline_over(
    dir: &std::path::Path,
    embedder: Arc<HashEmbedProvider>,
    index: Arc<SqliteVectorIndex>,
) -> IngestPipeline {
    IngestPipeline::new(embedder, index, PipelineConfig::default())
        .with_source(Box::new(JsonlDirectorySource::new(dir)))
}

/// Ingest the two-report feed, then ask for the Galwan report by topic.
#[tokio::test]
async fn end_to_end_galwan_scenario() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tokio::fs::write(
        dir.path().join("intel_stream.jsonl"),
        "{\"text\":\"Troop buildup near Galwan\",\"source\":\"SAT\"}\n\
         {\"text\":\"Routine patrol near Poonch\",\"source\":\"SAT\"}\n",
    )
    .await?;

    let embedder = Arc::new(HashEmbedProvider::new(DIM));
    let index = memory_index().await;
    let mut pipeline = pipeline_over(dir.path(), embedder.clone(), index.clone());

    let indexed = pipeline.drain_once().await;
    assert_eq!(indexed, 2);

    let query = embedder.embed_text("Galwan activity").await?;
    let hits = index.search(&query, 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Troop buildup near Galwan");
    assert_eq!(hits[0].source, "SAT");

    Ok(())
}

/// A record's own text is always its best match.
#[tokio::test]
async fn self_retrieval_ranks_top_1() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tokio::fs::write(
        dir.path().join("stream.jsonl"),
        "{\"text\":\"UAV airspace violation near Doklam\",\"source\":\"RADAR\"}\n\
         {\"text\":\"Artillery shelling reported at the ridge\",\"source\":\"HUMINT\"}\n\
         {\"text\":\"Satellite movement tracked over the coast\",\"source\":\"SAT\"}\n",
    )
    .await?;

    let embedder = Arc::new(HashEmbedProvider::new(DIM));
    let index = memory_index().await;
    let mut pipeline = pipeline_over(dir.path(), embedder.clone(), index.clone());
    pipeline.drain_once().await;

    for text in [
        "UAV airspace violation near Doklam",
        "Artillery shelling reported at the ridge",
        "Satellite movement tracked over the coast",
    ] {
        let query = embedder.embed_text(text).await?;
        let hits = index.search(&query, 1).await?;
        assert_eq!(hits[0].text, text, "self-retrieval failed for {text:?}");
        assert!(hits[0].score > 0.99, "score was {}", hits[0].score);
    }

    Ok(())
}

/// One corrupt entry followed by ten valid ones: exactly ten records land
/// in the index and the pipeline keeps running.
#[tokio::test]
async fn one_corrupt_entry_does_not_halt_ingestion() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut feed = String::from("{\"this is\": \"not a report\"}\n");
    for i in 0..10 {
        feed.push_str(&format!(
            "{{\"text\":\"Situation report number {i}\",\"source\":\"FIELD\"}}\n"
        ));
    }
    tokio::fs::write(dir.path().join("stream.jsonl"), feed).await?;

    let embedder = Arc::new(HashEmbedProvider::new(DIM));
    let index = memory_index().await;
    let mut pipeline = pipeline_over(dir.path(), embedder, index.clone());

    let indexed = pipeline.drain_once().await;
    assert_eq!(indexed, 10);
    assert_eq!(index.count().await?, 10);

    let stats = pipeline.stats_handle().snapshot().await;
    assert_eq!(stats.malformed_skipped, 1);
    assert_eq!(stats.records_indexed, 10);

    Ok(())
}

/// A restarted pipeline loses its cursors and re-reads the feed from the
/// start; content-derived ids turn the replay into duplicate skips.
#[tokio::test]
async fn restart_replay_does_not_duplicate_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let feed_path = dir.path().join("stream.jsonl");
    tokio::fs::write(
        &feed_path,
        "{\"text\":\"Cyber attack on comms\",\"source\":\"SIGINT\"}\n\
         {\"text\":\"Convoy sighted on the pass\",\"source\":\"SAT\"}\n",
    )
    .await?;

    let embedder = Arc::new(HashEmbedProvider::new(DIM));
    let index = memory_index().await;

    let mut first_run = pipeline_over(dir.path(), embedder.clone(), index.clone());
    assert_eq!(first_run.drain_once().await, 2);
    drop(first_run);

    // Simulated restart: fresh pipeline, fresh cursor, same index
    let mut second_run = pipeline_over(dir.path(), embedder.clone(), index.clone());
    assert_eq!(second_run.drain_once().await, 0);
    assert_eq!(index.count().await?, 2);
    assert_eq!(
        second_run.stats_handle().snapshot().await.duplicates_skipped,
        2
    );

    // New entries appended after the restart still come through
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&feed_path)
        .await?;
    file.write_all(b"{\"text\":\"Fresh report after restart\",\"source\":\"SAT\"}\n")
        .await?;
    file.flush().await?;

    assert_eq!(second_run.drain_once().await, 1);
    assert_eq!(index.count().await?, 3);

    Ok(())
}

/// Heavy concurrent read traffic against a live writer: no deadlocks, no
/// partially visible records, and full visibility once the writers finish.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_search_and_insert() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let index = Arc::new(
        SqliteVectorIndex::open(dir.path(), HashEmbedProvider::MODEL_NAME, DIM).await?,
    );
    let embedder = Arc::new(HashEmbedProvider::new(DIM));

    let mut writers = Vec::new();
    for i in 0..50 {
        let index = Arc::clone(&index);
        let embedder = Arc::clone(&embedder);
        writers.push(tokio::spawn(async move {
            let text = format!("Concurrent report {i}");
            let embedding = embedder.embed_text(&text).await.unwrap();
            let record = DocumentRecord {
                id: *blake3::hash(text.as_bytes()).as_bytes(),
                seq: None,
                text,
                source: "LOAD".to_string(),
                feed_timestamp: None,
                observed_at: 1_700_000_000,
                embedding,
            };
            index.insert(record).await.unwrap();
        }));
    }

    let mut readers = Vec::new();
    for i in 0..100 {
        let index = Arc::clone(&index);
        let embedder = Arc::clone(&embedder);
        readers.push(tokio::spawn(async move {
            let query = embedder
                .embed_text(&format!("Concurrent report {}", i % 50))
                .await
                .unwrap();
            let hits = index.search(&query, 10).await.unwrap();
            // Whatever snapshot the search saw, every hit is fully formed
            for hit in hits {
                assert!(!hit.text.is_empty());
                assert!(hit.score.is_finite());
            }
        }));
    }

    for writer in writers {
        writer.await?;
    }
    for reader in readers {
        reader.await?;
    }

    // Inserts are synchronization points: everything is now visible
    assert_eq!(index.count().await?, 50);
    let query = embedder.embed_text("Concurrent report 0").await?;
    let hits = index.search(&query, 50).await?;
    assert_eq!(hits.len(), 50);
    assert_eq!(hits[0].text, "Concurrent report 0");

    Ok(())
}

/// Monotonic visibility: a search issued after insert returns must include
/// the record whenever it would rank in the top-k.
#[tokio::test]
async fn insert_is_a_synchronization_point() -> anyhow::Result<()> {
    let embedder = Arc::new(HashEmbedProvider::new(DIM));
    let index = memory_index().await;

    for i in 0..10 {
        let text = format!("Visibility probe {i}");
        let embedding = embedder.embed_text(&text).await?;
        let record = DocumentRecord {
            id: *blake3::hash(text.as_bytes()).as_bytes(),
            seq: None,
            text: text.clone(),
            source: "PROBE".to_string(),
            feed_timestamp: None,
            observed_at: 1_700_000_000,
            embedding,
        };
        index.insert(record).await?;

        let query = embedder.embed_text(&text).await?;
        let hits = index.search(&query, 1).await?;
        assert_eq!(hits[0].text, text, "record invisible right after insert");
    }

    Ok(())
}
