use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, HashEmbedProvider};
use vigil_gateway::composer::{ComposerConfig, HttpChatComposer};
use vigil_gateway::router::build_router;
use vigil_gateway::server::{AppState, GatewayServer};
use vigil_gateway::service::QueryService;
use vigil_retriever::ingest::{
    CsvFeedSource, FeedWatcher, IngestPipeline, JsonlDirectorySource, PipelineConfig,
};
use vigil_retriever::storage::VectorIndex;
use vigil_retriever::storage::sqlite_index::SqliteVectorIndex;

const COMPOSER_API_KEY_ENV: &str = "VIGIL_COMPOSER_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Local ONNX sentence-embedding model
    Fastembed,
    /// Deterministic hash embedder, for offline runs and testing
    Hash,
}

/// Live report indexing and retrieval service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of line-delimited JSON feed files to watch
    #[arg(long, default_value = "live_data")]
    data_dir: PathBuf,

    /// Optional tabular feed file (timestamp, sector, report, priority)
    #[arg(long)]
    csv_feed: Option<PathBuf>,

    /// Directory holding the index database
    #[arg(long, default_value = ".")]
    index_dir: PathBuf,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Listen port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Embedding backend
    #[arg(long, value_enum, default_value = "fastembed")]
    embedder: EmbedderKind,

    /// Fallback feed poll interval, in seconds
    #[arg(long, default_value_t = 2)]
    poll_interval_secs: u64,

    /// OpenAI-compatible chat endpoint for answer composition
    #[arg(long)]
    composer_url: Option<String>,

    /// Model requested from the composer endpoint
    #[arg(long, default_value = "gemini-2.5-flash")]
    composer_model: String,

    /// Seconds allowed for composition before degrading to raw retrieval
    #[arg(long, default_value_t = 6)]
    composer_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tokio::fs::create_dir_all(&args.data_dir).await?;
    tokio::fs::create_dir_all(&args.index_dir).await?;

    let embedder: Arc<dyn EmbeddingProvider> = match args.embedder {
        EmbedderKind::Fastembed => {
            Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?)
        }
        EmbedderKind::Hash => {
            info!("Using deterministic hash embedder (offline mode)");
            Arc::new(HashEmbedProvider::default())
        }
    };

    let index = Arc::new(
        SqliteVectorIndex::open(
            &args.index_dir,
            embedder.model_name(),
            embedder.embedding_dimension(),
        )
        .await?,
    );
    info!(
        "Index opened under {} with {} records",
        args.index_dir.display(),
        index.count().await?
    );

    let mut service = QueryService::new(Arc::clone(&embedder), index.clone());
    if let Some(url) = &args.composer_url {
        let api_key = std::env::var(COMPOSER_API_KEY_ENV).ok();
        if api_key.is_none() {
            tracing::warn!("{COMPOSER_API_KEY_ENV} not set; calling composer unauthenticated");
        }
        let composer = HttpChatComposer::new(
            ComposerConfig::new(url.clone(), args.composer_model.clone()).with_api_key(api_key),
        )?;
        service = service
            .with_composer(Arc::new(composer))
            .with_composer_timeout(Duration::from_secs(args.composer_timeout_secs.max(1)));
        info!("Answer composition enabled via {url}");
    }

    // Feed watching is advisory; the pipeline's poll interval is the
    // correctness fallback.
    let (wake_tx, wake_rx) = mpsc::channel(4);
    let mut watch_paths = vec![args.data_dir.clone()];
    if let Some(csv) = &args.csv_feed {
        watch_paths.push(csv.clone());
    }
    let _watcher = FeedWatcher::watch(&watch_paths, wake_tx)?;

    let pipeline_config = PipelineConfig::default()
        .with_poll_interval(Duration::from_secs(args.poll_interval_secs.max(1)));
    let mut pipeline = IngestPipeline::new(Arc::clone(&embedder), index.clone(), pipeline_config)
        .with_source(Box::new(JsonlDirectorySource::new(&args.data_dir)))
        .with_waker(wake_rx);
    if let Some(csv) = &args.csv_feed {
        pipeline = pipeline.with_source(Box::new(CsvFeedSource::new(csv)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline_task = tokio::spawn(pipeline.run(shutdown_rx.clone()));

    let state = AppState {
        service: Arc::new(service),
        started_at: Instant::now(),
    };
    let server = GatewayServer::new(&args.bind, args.port, shutdown_rx);
    let mut server_task = tokio::spawn(server.serve(build_router(state)));

    tokio::select! {
        res = &mut server_task => {
            // The server only returns early on a startup or fatal error
            shutdown_tx.send(true).ok();
            pipeline_task.await??;
            res??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    shutdown_tx.send(true).ok();
    server_task.await??;
    pipeline_task.await??;
    Ok(())
}
