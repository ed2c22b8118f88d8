//! # signoff-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Configuration comes from the environment;
//! see [`signoff_api::AppConfig::from_env`].

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use signoff_api::state::LogFormat;
use signoff_api::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let metrics = if config.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    let port = config.port;
    let state = AppState::with_config(config, metrics);
    let seeded = state.seed_workflows().map_err(|e| {
        tracing::error!("workflow seeding failed: {e}");
        e
    })?;
    tracing::info!(workflows = seeded, "engine ready");

    let app = signoff_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Signoff API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
