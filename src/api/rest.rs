// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Everything in this file is read-only
// (signals, outcomes, whale alerts, baseline/regime stats) and requires no
// authentication, per SPEC_FULL §6 — "read endpoints other than [the control
// surface] are public". The only Bearer-gated endpoints are the control
// actions in `control.rs`-equivalent form below (pause/resume/kill,
// config reload), kept for compatibility with the UI even though this crate
// has no running/paused state machine of its own: pausing means the ingest
// loop stops calling into the pipeline, which `AppState` exposes as a single
// atomic flag.
//
// CORS is configured permissively, matching the teacher's development
// posture (tighten `allow_origin` in production).
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::store;
use crate::types::Strategy;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        // ── Public, read-only ────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/signals", get(list_signals))
        .route("/api/v1/signals/:id", get(signal_detail))
        .route("/api/v1/outcomes", get(list_outcomes))
        .route("/api/v1/outcomes/open", get(open_outcomes))
        .route("/api/v1/whale-alerts", get(list_whale_alerts))
        .route("/api/v1/stats/baseline/:symbol", get(baseline_stats))
        .route("/api/v1/stats/regime/:symbol", get(regime_stats))
        .route("/api/v1/stats/strategy/:strategy/:symbol", get(strategy_stats))
        // ── Bearer-gated control surface ─────────────────────────────
        .route("/api/v1/control/pause", post(control_pause))
        .route("/api/v1/control/resume", post(control_resume))
        .route("/api/v1/control/kill", post(control_kill))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    paused: bool,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        paused: state.paused.load(Ordering::Relaxed),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Signals (C6/C7)
// =============================================================================

#[derive(Deserialize)]
struct ListQuery {
    symbol: Option<String>,
    limit: Option<i64>,
}

async fn list_signals(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    match store::signals::recent_signals(state.store.pool(), q.symbol.as_deref(), clamp_limit(q.limit)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list signals");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list signals").into_response()
        }
    }
}

async fn signal_detail(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match store::signals::signal_by_id(state.store.pool(), id).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => (axum::http::StatusCode::NOT_FOUND, "signal not found").into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load signal");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to load signal").into_response()
        }
    }
}

// =============================================================================
// Outcomes / followups (C8)
// =============================================================================

async fn list_outcomes(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    match store::outcomes::recent_outcomes(state.store.pool(), q.symbol.as_deref(), clamp_limit(q.limit)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list outcomes");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list outcomes").into_response()
        }
    }
}

async fn open_outcomes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match store::outcomes::open_positions(state.store.pool()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list open outcomes");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list open outcomes").into_response()
        }
    }
}

// =============================================================================
// Whale alerts (C4)
// =============================================================================

async fn list_whale_alerts(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    match store::whale_alerts::recent_alerts_for_symbol(state.store.pool(), q.symbol.as_deref(), clamp_limit(q.limit)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list whale alerts");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list whale alerts").into_response()
        }
    }
}

// =============================================================================
// Stats (C1/C2/C7 strategy performance)
// =============================================================================

async fn baseline_stats(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> impl IntoResponse {
    match store::baselines::latest_baseline(state.store.pool(), &symbol).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => (axum::http::StatusCode::NOT_FOUND, "no baseline for symbol").into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load baseline");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to load baseline").into_response()
        }
    }
}

async fn regime_stats(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> impl IntoResponse {
    match store::regimes::latest_regime(state.store.pool(), &symbol).await {
        Ok(Some(row)) => Json(row).into_response(),
        Ok(None) => (axum::http::StatusCode::NOT_FOUND, "no regime row for symbol").into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load regime");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to load regime").into_response()
        }
    }
}

async fn strategy_stats(State(state): State<Arc<AppState>>, Path((strategy, symbol)): Path<(String, String)>) -> impl IntoResponse {
    let strategy = match strategy.as_str() {
        "VOLUME_BREAKOUT" => Strategy::VolumeBreakout,
        "MEAN_REVERSION" => Strategy::MeanReversion,
        "FAKEOUT_FILTER" => Strategy::FakeoutFilter,
        _ => return (axum::http::StatusCode::BAD_REQUEST, "unknown strategy").into_response(),
    };
    match store::signals::strategy_performance(state.store.pool(), strategy, &symbol).await {
        Ok(perf) => Json(perf).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load strategy performance");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to load strategy performance").into_response()
        }
    }
}

// =============================================================================
// Control surface (Bearer-gated)
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    ok: bool,
    paused: bool,
}

async fn control_pause(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.paused.store(true, Ordering::Relaxed);
    info!("control: pipeline paused via API");
    Json(ControlResponse { ok: true, paused: true })
}

async fn control_resume(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.paused.store(false, Ordering::Relaxed);
    info!("control: pipeline resumed via API");
    Json(ControlResponse { ok: true, paused: false })
}

async fn control_kill(auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    warn!(token = %auth.0, "control: shutdown requested via API");
    state.shutdown.cancel();
    Json(ControlResponse { ok: true, paused: state.paused.load(Ordering::Relaxed) })
}
