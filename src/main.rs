//! CLOB market data core
//!
//! Resolves the tracked instruments, supervises the market and user feed
//! connections, and runs the derived-view schedulers (debounced ladder
//! projection, candle gap-fill) plus the health/metrics server.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clob_market_data::publisher::StreamUpdate;
use clob_market_data::{
    account, messages, resolver, AppState, CandleSnapshot, ChannelConfig, Config,
    ConnectionManager, FeedMessage, Publisher,
};

/// Cadence of the silent-window check
const GAP_FILL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting CLOB market data core");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(slug = %config.market_slug, "Configuration loaded");

    // Resolve the instrument pair for the session
    let instruments = resolver::resolve(&config.gamma_endpoint, &config.market_slug).await?;
    info!(
        primary = %instruments.primary,
        complementary = %instruments.complementary,
        "Instruments resolved"
    );

    // Initialize publisher for IPC
    let publisher = Publisher::new(&config.ipc_socket_path).await?;

    // Create the session-owned service state
    let state = AppState::new(config, instruments, publisher);

    // Start health check server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Debounced ladder projection
    tokio::spawn(run_projector(state.clone()));

    // Candle gap-fill timer
    tokio::spawn(run_gap_fill(state.clone()));

    // Account feed, when credentials are configured
    let _user_handle = match state.config.auth_endpoint.clone() {
        Some(auth_endpoint) => match account::fetch_credentials(&auth_endpoint).await {
            Ok(credentials) => {
                let (manager, handle) = ConnectionManager::new(ChannelConfig {
                    label: "user",
                    url: state.config.user_url(),
                    subscribe_payload: account::subscribe_payload(&credentials),
                    ping_interval: Duration::from_secs(state.config.ping_interval_secs),
                    stale_after: Duration::from_secs(state.config.stale_after_secs),
                    backoff_base: Duration::from_millis(state.config.reconnect_base_ms),
                    backoff_max: Duration::from_millis(state.config.reconnect_max_ms),
                });
                let (inbound_tx, inbound_rx) = mpsc::channel(256);
                tokio::spawn(manager.run(inbound_tx));

                let account_state = state.clone();
                tokio::spawn(async move {
                    account::run_consumer(inbound_rx, &account_state.balance).await;
                });
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Account feed disabled: credential fetch failed");
                None
            }
        },
        None => {
            info!("No auth endpoint configured; account feed disabled");
            None
        }
    };

    // Market feed: supervise the connection and consume in arrival order
    let (manager, _market_handle) = ConnectionManager::new(ChannelConfig {
        label: "market",
        url: state.config.market_url(),
        subscribe_payload: messages::market_subscription(&state.instruments.all),
        ping_interval: Duration::from_secs(state.config.ping_interval_secs),
        stale_after: Duration::from_secs(state.config.stale_after_secs),
        backoff_base: Duration::from_millis(state.config.reconnect_base_ms),
        backoff_max: Duration::from_millis(state.config.reconnect_max_ms),
    });
    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    tokio::spawn(manager.run(inbound_tx));

    run_market_consumer(inbound_rx, state).await;

    Ok(())
}

/// Route decoded market-channel messages to the book engine and the candle
/// aggregator. Runs on one task, so per-connection arrival order is the
/// processing order.
async fn run_market_consumer(mut inbound: mpsc::Receiver<String>, state: Arc<AppState>) {
    while let Some(raw) = inbound.recv().await {
        match FeedMessage::parse(&raw) {
            Ok(FeedMessage::Diff(batch)) => {
                let changed = state.book.write().await.apply_batch(&batch);
                if changed {
                    state.book_dirty.notify_one();
                }
            }
            Ok(FeedMessage::Snapshot(snapshot)) => {
                let changed = state.book.write().await.apply_snapshot(&snapshot);
                if changed {
                    state.book_dirty.notify_one();
                }
            }
            Ok(FeedMessage::Trade(tick)) => {
                let mut candles = state.candles.write().await;
                if candles.apply_tick(&tick) {
                    let snapshots = candles.snapshots();
                    drop(candles); // Release lock before publishing
                    publish_candles(&state, &snapshots).await;
                }
            }
            Ok(FeedMessage::Keepalive) => {}
            Ok(FeedMessage::Unknown(msg)) => {
                tracing::trace!(msg = %msg, "Unknown message type");
            }
            Err(e) => warn!(error = %e, "Failed to parse market message"),
        }
    }
}

/// Recompute the top-of-book view after a quiet period, coalescing bursts
/// of diff messages into one downstream update
async fn run_projector(state: Arc<AppState>) {
    let debounce = Duration::from_millis(state.config.debounce_ms);
    loop {
        state.book_dirty.notified().await;
        sleep(debounce).await;

        let view = state.book.read().await.project(state.config.book_depth);
        state.book_view.send_replace(view.clone());
        if let Err(e) = state.publisher.publish(&StreamUpdate::Book(&view)).await {
            debug!(error = %e, "Failed to publish book view");
        }
    }
}

/// Synthesize flat candles for silent windows every second
async fn run_gap_fill(state: Arc<AppState>) {
    let mut ticker = interval(GAP_FILL_INTERVAL);
    loop {
        ticker.tick().await;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut candles = state.candles.write().await;
        if candles.fill_gaps(now_ms) {
            let snapshots = candles.snapshots();
            drop(candles);
            publish_candles(&state, &snapshots).await;
        }
    }
}

async fn publish_candles(state: &AppState, snapshots: &[CandleSnapshot]) {
    state.candle_view.send_replace(snapshots.to_vec());
    if let Err(e) = state
        .publisher
        .publish(&StreamUpdate::Candles(snapshots))
        .await
    {
        debug!(error = %e, "Failed to publish candle snapshots");
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-data",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
