//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use framereel_media::{ffmpeg_version, resolve_ffmpeg};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use framereel_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("framereel=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting framereel-api {}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, scratch_dir={}, frame_rate={}",
        config.host,
        config.port,
        config.scratch_dir.display(),
        config.frame_rate
    );

    // Log the encoder version; a missing binary surfaces per request and on /ready
    match resolve_ffmpeg(Some(&config.ffmpeg_fallback_path)) {
        Ok(binary) => {
            if let Err(e) = ffmpeg_version(&binary).await {
                warn!("Could not get FFmpeg version: {}", e);
            }
        }
        Err(e) => warn!("{}", e),
    }

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(config);
    let app = create_router(state, metrics_handle);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
