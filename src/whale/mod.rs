// =============================================================================
// Whale Detector (C4)
// =============================================================================
//
// Runs synchronously on the ingest thread for the triggering tick (SPEC_FULL
// §5: detection must complete within a few milliseconds) so `on_tick` takes
// no lock across an `.await` and never itself awaits anything. Baselines and
// volatility are refreshed out-of-band by the C1/C2 jobs via `set_baseline`/
// `set_volatility`, mirroring `risk.rs`'s `RwLock`-guarded `Inner` rather than
// reaching into the store from the hot path. Persistence and alert fan-out
// are pushed onto a background task, grounded on `app_state.rs`'s pattern of
// keeping shared maps behind `parking_lot::RwLock` and dispatching I/O off
// the critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::models::{BaselineRow, WhaleAlertRow};
use crate::store::{self, Store};
use crate::types::Side;

/// Tick value below which even a usable baseline hit is discarded.
const MIN_SAFE_VALUE: f64 = 100_000_000.0;
/// Hard-floor lot count used when no baseline is available.
const FALLBACK_MIN_LOTS: f64 = 2500.0;
/// Hard-floor trade value used when no baseline is available.
const FALLBACK_MIN_VALUE: f64 = 1_000_000_000.0;
/// Below this value a tick is not even worth buffering for accumulation.
const ACCUMULATION_FLOOR: f64 = 10_000_000.0;
/// Rapid-accumulation window.
const ACCUMULATION_WINDOW_SECS: i64 = 5;
/// Minimum buffered ticks before an accumulation is re-evaluated.
const ACCUMULATION_MIN_COUNT: usize = 3;

#[derive(Debug, Clone)]
struct BufferedTick {
    ts: DateTime<Utc>,
    side: Side,
    price: f64,
    volume_lots: f64,
    value: f64,
}

/// Result of a single-trade or aggregated-accumulation evaluation.
struct Detection {
    z_score: f64,
    adaptive_threshold: f64,
    volume_vs_avg_pct: f64,
    confidence: f64,
}

fn adaptive_threshold(atr_pct: f64) -> f64 {
    if atr_pct > 1.5 {
        3.5
    } else if atr_pct < 0.5 {
        2.5
    } else {
        3.0
    }
}

fn confidence_from_z(z: f64, volume_vs_avg_pct: f64) -> f64 {
    let z_component = (70.0 + (z - 3.0) * 15.0).clamp(50.0, 100.0);
    let bonus = if volume_vs_avg_pct <= 500.0 {
        0.0
    } else if volume_vs_avg_pct >= 1000.0 {
        10.0
    } else {
        (volume_vs_avg_pct - 500.0) / 500.0 * 10.0
    };
    (z_component + bonus).min(100.0)
}

/// Evaluates a trade value/lot pair against a symbol's baseline. Shared by
/// both the single-trade path and the rapid-accumulation re-evaluation
/// (SPEC_FULL §4.4: the aggregated sum is "re-evaluated using the same
/// Z/fallback rules").
fn evaluate(value: f64, lots: f64, baseline: Option<&BaselineRow>, atr_pct: Option<f64>) -> Option<Detection> {
    if value < MIN_SAFE_VALUE {
        return None;
    }

    match baseline.filter(|b| b.is_usable()) {
        Some(b) => {
            let z = (lots - b.volume_mean) / b.volume_stddev;
            let tau = adaptive_threshold(atr_pct.unwrap_or(1.0));
            let volume_vs_avg_pct = if b.volume_mean > f64::EPSILON {
                lots / b.volume_mean * 100.0
            } else {
                0.0
            };
            let hit = z >= tau || lots >= 5.0 * b.volume_mean;
            if !hit {
                return None;
            }
            Some(Detection {
                z_score: z,
                adaptive_threshold: tau,
                volume_vs_avg_pct,
                confidence: confidence_from_z(z, volume_vs_avg_pct),
            })
        }
        None => {
            let hit = lots >= FALLBACK_MIN_LOTS || value >= FALLBACK_MIN_VALUE;
            if !hit {
                return None;
            }
            Some(Detection { z_score: 0.0, adaptive_threshold: 0.0, volume_vs_avg_pct: 0.0, confidence: 40.0 })
        }
    }
}

pub struct WhaleDetector {
    store: Arc<Store>,
    alert_tx: mpsc::UnboundedSender<WhaleAlertRow>,
    baselines: RwLock<HashMap<String, BaselineRow>>,
    volatility: RwLock<HashMap<String, f64>>,
    buffers: RwLock<HashMap<String, Arc<Mutex<VecDeque<BufferedTick>>>>>,
}

impl WhaleDetector {
    pub fn new(store: Arc<Store>, alert_tx: mpsc::UnboundedSender<WhaleAlertRow>) -> Arc<Self> {
        Arc::new(Self {
            store,
            alert_tx,
            baselines: RwLock::new(HashMap::new()),
            volatility: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
        })
    }

    /// Called by the C1 baseline job whenever a fresh baseline is computed.
    pub fn set_baseline(&self, row: BaselineRow) {
        self.baselines.write().insert(row.symbol.clone(), row);
    }

    /// Called by the C2 regime job with the symbol's current ATR%.
    pub fn set_volatility(&self, symbol: &str, atr_pct: f64) {
        self.volatility.write().insert(symbol.to_string(), atr_pct);
    }

    fn buffer_for(&self, symbol: &str) -> Arc<Mutex<VecDeque<BufferedTick>>> {
        if let Some(buf) = self.buffers.read().get(symbol) {
            return buf.clone();
        }
        self.buffers
            .write()
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    /// Synchronous detection entry point — called directly from the ingest
    /// thread for every successfully persisted tick, never awaited.
    pub fn on_tick(self: &Arc<Self>, tick: &crate::store::models::TickRow) {
        let baseline = self.baselines.read().get(&tick.symbol).cloned();
        let atr_pct = self.volatility.read().get(&tick.symbol).copied();

        if let Some(detection) = evaluate(tick.total_value, tick.volume_lots, baseline.as_ref(), atr_pct) {
            self.emit_single(tick, detection, atr_pct);
            return;
        }

        if tick.total_value >= ACCUMULATION_FLOOR {
            self.accumulate(tick, baseline.as_ref(), atr_pct);
        }
    }

    fn accumulate(self: &Arc<Self>, tick: &crate::store::models::TickRow, baseline: Option<&BaselineRow>, atr_pct: Option<f64>) {
        let buf = self.buffer_for(&tick.symbol);
        let window_start = tick.ts - ChronoDuration::seconds(ACCUMULATION_WINDOW_SECS);

        // Short critical section, no I/O: push, prune, and — on a hit — drain.
        let hit = {
            let mut guard = buf.lock();
            guard.push_back(BufferedTick {
                ts: tick.ts,
                side: tick.side(),
                price: tick.price,
                volume_lots: tick.volume_lots,
                value: tick.total_value,
            });
            while let Some(front) = guard.front() {
                if front.ts < window_start {
                    guard.pop_front();
                } else {
                    break;
                }
            }

            if guard.len() < ACCUMULATION_MIN_COUNT {
                None
            } else {
                let sum_lots: f64 = guard.iter().map(|t| t.volume_lots).sum();
                let sum_value: f64 = guard.iter().map(|t| t.value).sum();
                match evaluate(sum_value, sum_lots, baseline, atr_pct) {
                    Some(detection) => {
                        let buy_lots: f64 = guard.iter().filter(|t| t.side == Side::Buy).map(|t| t.volume_lots).sum();
                        let majority_side = if buy_lots >= sum_lots - buy_lots { Side::Buy } else { Side::Sell };
                        let weighted_price: f64 = guard.iter().map(|t| t.price * t.volume_lots).sum();
                        let vwap = if sum_lots > f64::EPSILON { weighted_price / sum_lots } else { tick.price };
                        let pattern_trade_count = guard.len() as i32;
                        let result = (detection, majority_side, vwap, pattern_trade_count, sum_lots, sum_value);
                        guard.clear();
                        Some(result)
                    }
                    None => None,
                }
            }
        };

        if let Some((detection, side, vwap, pattern_trade_count, sum_lots, sum_value)) = hit {
            self.emit_rapid(tick, detection, side, vwap, sum_lots, sum_value, pattern_trade_count, atr_pct);
        }
    }

    fn emit_single(&self, tick: &crate::store::models::TickRow, detection: Detection, atr_pct: Option<f64>) {
        let row = WhaleAlertRow {
            id: Uuid::new_v4(),
            detected_at: tick.ts,
            symbol: tick.symbol.clone(),
            alert_type: "SINGLE_TRADE".to_string(),
            side: tick.side.clone(),
            trigger_price: tick.price,
            trigger_volume_lots: tick.volume_lots,
            trigger_value: tick.total_value,
            pattern_trade_count: 1,
            z_score: detection.z_score,
            volume_vs_avg_pct: detection.volume_vs_avg_pct,
            avg_price: None,
            confidence_score: detection.confidence,
            adaptive_threshold: detection.adaptive_threshold,
            volatility_pct: atr_pct.unwrap_or(0.0),
            board: tick.board.clone(),
        };
        self.dispatch(row);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_rapid(
        &self,
        tick: &crate::store::models::TickRow,
        detection: Detection,
        side: Side,
        vwap: f64,
        sum_lots: f64,
        sum_value: f64,
        pattern_trade_count: i32,
        atr_pct: Option<f64>,
    ) {
        let row = WhaleAlertRow {
            id: Uuid::new_v4(),
            detected_at: tick.ts,
            symbol: tick.symbol.clone(),
            alert_type: "RAPID_ACCUMULATION".to_string(),
            side: side.to_string(),
            trigger_price: tick.price,
            trigger_volume_lots: sum_lots,
            trigger_value: sum_value,
            pattern_trade_count,
            z_score: detection.z_score,
            volume_vs_avg_pct: detection.volume_vs_avg_pct,
            avg_price: Some(vwap),
            confidence_score: detection.confidence,
            adaptive_threshold: detection.adaptive_threshold,
            volatility_pct: atr_pct.unwrap_or(0.0),
            board: tick.board.clone(),
        };
        self.dispatch(row);
    }

    /// Persists and broadcasts an alert off the ingest thread.
    fn dispatch(&self, row: WhaleAlertRow) {
        let pool = self.store.pool().clone();
        let persisted = row.clone();
        tokio::spawn(async move {
            if let Err(e) = store::whale_alerts::insert_whale_alert(&pool, &persisted).await {
                if !e.is_duplicate() {
                    warn!(symbol = %persisted.symbol, error = %e, "failed to persist whale alert");
                }
            }
        });

        if self.alert_tx.send(row).is_err() {
            debug!("whale alert channel has no receivers, alert dropped from downstream fan-out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(sample_size: i64, volume_mean: f64, volume_stddev: f64) -> BaselineRow {
        BaselineRow {
            symbol: "ABCD".into(),
            calculated_at: Utc::now(),
            lookback_hours: 1,
            sample_size,
            price_mean: 1000.0,
            price_stddev: 10.0,
            price_median: 1000.0,
            price_p25: 990.0,
            price_p75: 1010.0,
            volume_mean,
            volume_stddev,
            volume_median: volume_mean,
            volume_p25: volume_mean * 0.8,
            volume_p75: volume_mean * 1.2,
            value_mean: volume_mean * 1000.0,
            value_stddev: 1000.0,
            value_median: volume_mean * 1000.0,
            value_p25: volume_mean * 800.0,
            value_p75: volume_mean * 1200.0,
        }
    }

    // S1 from the scenario table: baseline mu_vol=500, sigma_vol=100, tick 1600
    // lots at 1020 -> z ~= 11.0, confidence 100, volume_vs_avg 320%.
    #[test]
    fn single_trade_scenario_s1() {
        let b = baseline(40, 500.0, 100.0);
        let value = 1600.0 * 1020.0 * 100.0; // lots -> shares -> value, well above 100M
        let d = evaluate(value, 1600.0, Some(&b), Some(1.0)).expect("expected a hit");
        assert!((d.z_score - 11.0).abs() < 1e-9);
        assert!((d.volume_vs_avg_pct - 320.0).abs() < 1e-9);
        assert!((d.confidence - 100.0).abs() < 1e-9);
    }

    // S2: no baseline, 3000 lots at 4000 price (value 1.2B) -> fallback hit at
    // confidence 40; 2000 lots at 200 price (value 40M) -> no alert.
    #[test]
    fn fallback_scenario_s2() {
        let hit = evaluate(1_200_000_000.0, 3000.0, None, None).expect("fallback hit");
        assert!((hit.confidence - 40.0).abs() < 1e-9);

        assert!(evaluate(40_000_000.0, 2000.0, None, None).is_none());
    }

    #[test]
    fn below_min_safe_value_always_rejected_even_with_baseline() {
        let b = baseline(40, 10.0, 1.0);
        // z would be enormous here, but value never crosses MIN_SAFE_VALUE.
        assert!(evaluate(50_000_000.0, 500.0, Some(&b), Some(1.0)).is_none());
    }

    #[test]
    fn unusable_baseline_falls_back_to_hard_floor() {
        let thin = baseline(5, 500.0, 100.0); // sample_size < 30 => not usable
        assert!(evaluate(150_000_000.0, 100.0, Some(&thin), Some(1.0)).is_none());
        assert!(evaluate(150_000_000.0, 3000.0, Some(&thin), Some(1.0)).is_some());
    }

    #[test]
    fn adaptive_threshold_widens_in_calm_markets() {
        assert!((adaptive_threshold(0.3) - 2.5).abs() < 1e-9);
        assert!((adaptive_threshold(1.0) - 3.0).abs() < 1e-9);
        assert!((adaptive_threshold(2.0) - 3.5).abs() < 1e-9);
    }
}
