// =============================================================================
// Aurora Tick Engine — Main Entry Point
// =============================================================================
//
// Wires every subsystem together: the exchange feed drives the tick
// ingestor (C3), which fans out synchronously to the whale detector (C4),
// order-flow aggregator (C5), and candle builder; periodic jobs recompute
// the baseline store (C1) and regime classifier (C2); whale alerts flow
// through the signal dispatcher (C6/C7/C8); the SSE broker (C9) and REST
// API expose everything to the UI. Grounded on the teacher's `main.rs`
// startup sequence (module-by-module spawn, Ctrl+C graceful shutdown).
// =============================================================================

mod api;
mod app_state;
mod baseline;
mod cache;
mod candles;
mod config;
mod dashboard;
mod error;
mod feed;
mod filters;
mod indicators;
mod ingest;
mod market_data;
mod order_flow;
mod outcome;
mod pipeline;
mod regime;
mod signals;
mod sse;
mod store;
mod types;
mod webhook;
mod whale;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::Config;
use crate::feed::{FeedSource, WsFeedSource};
use crate::ingest::Ingestor;
use crate::order_flow::OrderFlowAggregator;
use crate::regime::RegimeDetector;
use crate::sse::SseBroker;
use crate::store::Store;
use crate::webhook::{WebhookFilter, WebhookNotifier};
use crate::whale::WhaleDetector;

const DB_MAX_CONNECTIONS: u32 = 10;
const FEED_RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("aurora-tick-engine starting up");

    let config = Arc::new(Config::from_env()?);
    info!(symbols = ?config.symbols, "configuration loaded");

    let store = Arc::new(Store::connect(&config.database_url, DB_MAX_CONNECTIONS).await?);
    let cache = cache::Cache::connect(&config.redis_url).await?;

    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let whale = WhaleDetector::new(store.clone(), alert_tx);
    let order_flow = OrderFlowAggregator::new(store.clone());
    let regime = RegimeDetector::new();
    let (broker, broker_task) = SseBroker::new();

    let shutdown = CancellationToken::new();
    let paused = Arc::new(AtomicBool::new(false));

    let webhook_notifier = config.webhook_url.clone().map(|url| WebhookNotifier::new(url, WebhookFilter::default()));

    let state = AppState::new(store.clone(), config.clone(), cache.clone(), regime.clone(), broker.clone(), paused.clone(), shutdown.clone());

    // ── Background jobs ──────────────────────────────────────────────
    tokio::spawn(broker_task.run(shutdown.clone()));

    tokio::spawn(order_flow.clone().run_flush_loop(shutdown.clone()));

    tokio::spawn(baseline::run_baseline_job(store.clone(), cache.clone(), whale.clone(), config.symbols.clone(), shutdown.clone()));

    tokio::spawn(regime::run_regime_job(store.clone(), regime.clone(), whale.clone(), config.symbols.clone(), shutdown.clone()));

    tokio::spawn(outcome::run_outcome_poller(store.clone(), config.clone(), broker.clone(), webhook_notifier.clone(), shutdown.clone()));

    tokio::spawn(dashboard::run_dashboard_gatherer(store.clone(), broker.clone(), config.symbols.clone(), shutdown.clone()));

    tokio::spawn(pipeline::run_dispatcher(
        store.clone(),
        config.clone(),
        cache.clone(),
        regime.clone(),
        broker.clone(),
        webhook_notifier.clone(),
        paused.clone(),
        alert_rx,
    ));

    // ── Tick ingestor, fed by the exchange WebSocket feed ────────────
    let ingestor = Arc::new(Ingestor::new(store.clone(), whale.clone(), order_flow.clone()));
    let feed_url = config.feed_url.clone();
    let feed_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            let mut source = WsFeedSource::new(feed_url.clone());
            loop {
                tokio::select! {
                    _ = feed_shutdown.cancelled() => return,
                    frame = source.next_frame() => match frame {
                        Ok(Some(frame)) => ingestor.ingest(frame).await,
                        Ok(None) => break,
                        Err(e) => {
                            error!(error = %e, "feed read error, reconnecting");
                            break;
                        }
                    },
                }
            }
            tokio::select! {
                _ = feed_shutdown.cancelled() => return,
                _ = tokio::time::sleep(FEED_RECONNECT_DELAY) => {}
            }
        }
    });

    // ── REST + SSE server ─────────────────────────────────────────────
    let bind_addr = format!("0.0.0.0:{}", config.server_port);
    let app = api::rest::router(state.clone()).merge(api::sse::router(state.clone()));
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(async move { server_shutdown.cancelled().await }).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        _ = shutdown.cancelled() => {
            warn!("shutdown requested via control API");
        }
    }

    shutdown.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!("aurora-tick-engine shut down complete");
    Ok(())
}
