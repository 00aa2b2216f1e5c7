//! Finexplain Server - HTTP API that explains finance concepts with a seq2seq model

mod api;
mod config;

use anyhow::Context;
use finexplain_core::{dataset, select_device, ModelConfig, ModelRuntime, SamplingConfig};
use std::sync::Arc;
use tracing::info;

use crate::api::{AppState, RouterLimits};
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    info!("Selected model: {} ({})", config.model_id, config.revision);

    let cors = api::cors_layer(&config.cors_origins)?;

    if let Some(dataset) = dataset::load_optional(&config.dataset_path)? {
        info!("Reference dataset ready ({} pairs)", dataset.len());
    }

    let device = select_device(config.force_cpu)?;
    let model_config = ModelConfig {
        revision: config.revision.clone(),
        ..ModelConfig::with_model_id(config.model_id.clone())
    };

    // Model load is blocking network and disk work
    info!("Initializing model runtime...");
    let runtime = tokio::task::spawn_blocking(move || ModelRuntime::load(model_config, device))
        .await
        .context("model loading task failed")??;

    let stats = runtime.stats();
    info!("Runtime initialized successfully!");
    info!("  Model: {}", stats.model_id);
    info!("  Vocab size: {}", stats.vocab_size);
    info!("  Hidden size: {}", stats.hidden_size);
    info!("  Layers: {}", stats.num_layers);
    info!("  Device: {}", stats.device);

    let sampling = SamplingConfig::finance_default();
    sampling.validate()?;
    info!("Sampling: {:?}", sampling);

    let state = AppState::new(Arc::new(runtime), sampling, Arc::new(stats));
    let limits = RouterLimits {
        request_timeout: config.request_timeout,
        max_concurrency: config.max_concurrency,
    };

    // Build router
    let app = api::create_router(state, cors, &limits);

    // Start server
    let addr = config.bind_addr();
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
