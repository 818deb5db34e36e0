// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the process-wide singletons together (SPEC_FULL §5: "constructed at
// startup as fields of a central `AppState`, per the teacher's own
// architecture") and is the `axum` `State` handed to every REST/SSE route.
// Generalized from the teacher's `AppState` — the dashboard-snapshot /
// decision-audit / multi-engine surface is gone; what survives is the same
// "one struct, one Arc, shared by every async task" shape.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::config::Config;
use crate::regime::RegimeDetector;
use crate::sse::SseBroker;
use crate::store::Store;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
    pub cache: Cache,
    pub regime: Arc<RegimeDetector>,
    pub broker: SseBroker,
    pub start_time: Instant,
    /// Set by `/api/v1/control/pause`/`resume`; consulted by the signal
    /// dispatcher before opening new positions. Ticks, whale detection, and
    /// candle/regime/baseline jobs keep running while paused — only new
    /// position entries stop.
    pub paused: Arc<AtomicBool>,
    /// Cancelled by `/api/v1/control/kill`; every background task selects on
    /// this alongside its own timers.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        config: Arc<Config>,
        cache: Cache,
        regime: Arc<RegimeDetector>,
        broker: SseBroker,
        paused: Arc<AtomicBool>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self { store, config, cache, regime, broker, start_time: Instant::now(), paused, shutdown })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
