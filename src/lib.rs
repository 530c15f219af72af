pub mod analysis;
pub mod db;
pub mod engines;
pub mod posture;
pub mod relay;
pub mod settings;
pub mod store;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use analysis::{AnalysisController, AnalysisQueue, AnalysisWorker, ConsistencyBuffer};
use db::Database;
use engines::{LandmarkExtractor, PostureModel};
use relay::{routes, ComputePool, FrameHub, RelayContext};
use settings::{Args, Settings};
use store::{MemoryStore, StateStore};

pub fn run() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (reads RUST_LOG env var)
    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if settings::debug_mode() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        logger.filter_level(level);
    }
    logger.init();

    info!("shpd-relay starting up...");

    let settings = Settings::from_args(&args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(settings))
}

#[cfg(feature = "onnx")]
fn load_engines(settings: &Settings) -> Result<(Arc<dyn LandmarkExtractor>, Arc<dyn PostureModel>)> {
    let models = &settings.models;
    let extractor = engines::OnnxLandmarkExtractor::new(
        &models.landmark_model,
        models.landmark_min_confidence,
    )?;
    let model = engines::OnnxPostureModel::new(&models.posture_model, &models.posture_labels)?;
    Ok((Arc::new(extractor), Arc::new(model)))
}

#[cfg(not(feature = "onnx"))]
fn load_engines(_settings: &Settings) -> Result<(Arc<dyn LandmarkExtractor>, Arc<dyn PostureModel>)> {
    anyhow::bail!("no inference engine compiled in; rebuild with `--features onnx`")
}

/// Builds every collaborator once, serves until ctrl-c, then stops the
/// analysis worker.
pub async fn serve(settings: Settings) -> Result<()> {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let db = Database::new(settings.db_path.clone())?;

    let (extractor, model) = load_engines(&settings)?;

    let pool = ComputePool::new(settings.relay.compute_threads);
    let (analysis, jobs) = AnalysisQueue::channel();
    let worker = AnalysisWorker::new(
        store.clone(),
        db.clone(),
        model,
        pool.clone(),
        ConsistencyBuffer::new(
            settings.analysis.buffer_length,
            settings.analysis.min_consistency,
        ),
        settings.analysis.timeline_cap,
    );
    let mut controller = AnalysisController::new();
    controller.start(worker, jobs)?;

    let shutdown = CancellationToken::new();
    let ctx = RelayContext {
        store,
        extractor,
        pool,
        hub: FrameHub::new(settings.relay.output_queue_capacity),
        analysis,
        monitor_config: settings.monitor_config(),
        jpeg_quality: settings.relay.jpeg_quality,
        shutdown: shutdown.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    info!("Relay listening on {}", settings.bind);

    axum::serve(listener, routes::router(ctx))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("relay server failed")?;

    controller.stop().await?;
    info!("shpd-relay stopped");
    Ok(())
}
