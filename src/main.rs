//! pulse-feeds: binary entrypoint.
//! Loads config, starts the dashboard's background tasks and serves the JSON surface.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_feeds::api::{self, AppState};
use pulse_feeds::config;
use pulse_feeds::metrics::Metrics;
use pulse_feeds::Dashboard;

/// Compact logs by default, JSON lines when `PULSE_LOG_JSON=1`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulse_feeds=info,warn"));
    let json = std::env::var("PULSE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler failed: {e:#}");
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default().context("loading config")?;
    tracing::info!(
        base_url = %cfg.base_url,
        view = %cfg.initial_view,
        live_secs = ?cfg.live_secs,
        "config loaded"
    );

    let metrics = Metrics::init()?;
    let dashboard = Arc::new(Dashboard::from_config(&cfg).await?);
    dashboard.start();

    let app = api::router(AppState::new(dashboard.clone())).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    dashboard.shutdown();
    Ok(())
}
