//! Candle Stream Binary
//!
//! Streams one candle series from DXLink and logs each published snapshot.
//!
//! # Usage
//!
//! ```bash
//! DXLINK_TOKEN=... cargo run --bin candle-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DXLINK_TOKEN`: DXLink API quote token
//!
//! ## Optional
//! - `DXLINK_URL`: WebSocket endpoint (default: tastytrade's DXLink endpoint)
//! - `STREAM_SYMBOL`: underlying symbol (default: SPY)
//! - `STREAM_INTERVAL`: candle period (default: 5m)
//! - `STREAM_EXTENDED_HOURS`: include extended hours (default: false)
//! - `STREAM_START_TIME`: RFC 3339 start (default: today 00:00 local)
//! - `STREAM_POLL_TIMEOUT_MS`: bounded wait per poll (default: 2000)
//! - `STREAM_HEARTBEAT_PERIOD_MS`: heartbeat period (default: 100)
//! - `STREAM_KEEPALIVE_INTERVAL_SECS` / `STREAM_KEEPALIVE_TIMEOUT_SECS` (default: 30 / 60)
//! - `STREAM_CONNECT_ATTEMPTS`: connect attempts (default: 5)
//! - `STREAM_PUBLISH_CAPACITY`: renderer channel capacity (default: 16)
//! - `STREAM_METRICS_PORT`: Prometheus port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::anyhow;
use candle_stream::infrastructure::broadcast::log_series;
use candle_stream::infrastructure::telemetry;
use candle_stream::{
    DxLinkClient, DxLinkClientConfig, HeartbeatTask, PrometheusMetrics, SeriesBroadcast, Spinner,
    StreamConfig, StreamLoop, init_metrics,
};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting candle stream");

    let config = StreamConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    log_config(&config);

    match init_metrics(config.stream.metrics_port) {
        Ok(true) => tracing::info!(port = config.stream.metrics_port, "Metrics exporter listening"),
        Ok(false) => tracing::debug!("Metrics exporter disabled"),
        Err(e) => tracing::warn!(error = %e, "Failed to start metrics exporter"),
    }

    let stop = CancellationToken::new();

    // Rendering hand-off
    let broadcast = SeriesBroadcast::new(config.stream.publish_capacity);
    let renderer = tokio::spawn(log_series(broadcast.subscribe(), stop.clone()));

    let heartbeat = HeartbeatTask::new(config.stream.heartbeat_period, Spinner::default());
    tokio::spawn(log_heartbeat(heartbeat.label(), stop.clone()));

    tokio::spawn(await_shutdown(stop.clone()));

    let client = DxLinkClient::new(DxLinkClientConfig::from_config(&config));
    let result = StreamLoop::new(
        config.subscription.clone(),
        config.stream.poll_timeout,
        client,
        broadcast,
        heartbeat,
        &stop,
    )
    .with_metrics(Arc::new(PrometheusMetrics))
    .run()
    .await;

    stop.cancel();
    let rendered = renderer.await.unwrap_or_default();

    let report = result?;
    tracing::info!(
        events = report.pipeline.events,
        decode_failures = report.pipeline.decode_failures,
        publishes = report.pipeline.publishes,
        rendered,
        heartbeat_ticks = report.heartbeat_ticks,
        "Candle stream stopped"
    );
    Ok(())
}

/// Trace the heartbeat label on every change.
async fn log_heartbeat(mut label: watch::Receiver<String>, stop: CancellationToken) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            changed = label.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::trace!(label = %*label.borrow_and_update(), "Heartbeat");
            }
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        symbol = %config.subscription.candle_symbol(),
        from = %config.subscription.from_time,
        poll_timeout_ms = config.stream.poll_timeout.as_millis(),
        heartbeat_ms = config.stream.heartbeat_period.as_millis(),
        metrics_port = config.stream.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        url = %config.dxlink.url,
        keepalive_secs = config.dxlink.keepalive_interval.as_secs(),
        connect_attempts = config.dxlink.connect_attempts,
        "DXLink endpoint"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT), then cancel `stop`.
async fn await_shutdown(stop: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = stop.cancelled() => return,
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    stop.cancel();
}
