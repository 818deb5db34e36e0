// =============================================================================
// SSE endpoints — Axum 0.7
// =============================================================================
//
// Two routes per SPEC_FULL §6: `/api/events` (whale alerts only) and
// `/api/dashboard/sse` (the six dashboard streams gathered periodically by
// `dashboard.rs`). Both subscribe to the same `SseBroker` and differ only in
// which event names they forward — axum's `Sse` response handles the
// `data: <json>\n\n` framing and keep-alive pings itself.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::extract::State;
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::sse::Event;

const DASHBOARD_EVENTS: [&str; 6] = ["live_trades", "pressure_gauge", "whale_alerts", "volume_spikes", "zscore_ranking", "power_candles"];

fn to_sse_event(event: Event) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().event(event.name).data(event.data.to_string()))
}

fn event_stream(state: Arc<AppState>, names: &'static [&'static str]) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(None, move |sub| {
        let state = state.clone();
        async move {
            let mut sub = match sub {
                Some(s) => s,
                None => state.broker.subscribe().await,
            };
            loop {
                let event = sub.recv().await?;
                if names.contains(&event.name) {
                    return Some((to_sse_event(event), Some(sub)));
                }
            }
        }
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/events", get(whale_events))
        .route("/api/dashboard/sse", get(dashboard_events))
        .layer(cors)
        .with_state(state)
}

async fn whale_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stream = event_stream(state, &["whale_alert"]).boxed();
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn dashboard_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stream = event_stream(state, &DASHBOARD_EVENTS).boxed();
    Sse::new(stream).keep_alive(KeepAlive::default())
}
