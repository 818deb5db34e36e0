// =============================================================================
// Dashboard snapshot gatherer
// =============================================================================
//
// `/api/dashboard/sse` (SPEC_FULL §6) promises six named streams
// (`live_trades`, `pressure_gauge`, `whale_alerts`, `volume_spikes`,
// `zscore_ranking`, `power_candles`) on a 5-10s cadence. None of those are
// discrete events the rest of the system already publishes the way
// `whale_alert`/`position_opened`/`position_closed` are — they are periodic
// snapshots across the configured symbol set. This job gathers each one from
// the store on a fixed timer and publishes it to the broker under its name,
// the same periodic-recompute-and-publish shape as `baseline.rs`'s C1 job.
//
// `zscore_ranking` and `power_candles` have no dedicated source table;
// they are derived here from the latest tick/baseline and latest 5m candle
// respectively (see DESIGN.md, "dashboard gatherer").

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sse::SseBroker;
use crate::store::{self, Store};
use crate::types::AlertType;

const REFRESH_INTERVAL: Duration = Duration::from_secs(7);
const POWER_CANDLE_INTERVAL: &str = "5m";
const RECENT_ALERTS_LIMIT: i64 = 20;
const VOLUME_SPIKE_WINDOW_MINUTES: i64 = 15;

async fn gather_live_trades(store: &Store, symbols: &[String]) -> serde_json::Value {
    let mut trades = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if let Ok(Some(tick)) = store::ticks::latest_tick(store.pool(), symbol).await {
            trades.push(serde_json::json!({
                "symbol": tick.symbol,
                "side": tick.side,
                "price": tick.price,
                "volume_shares": tick.volume_shares,
                "ts": tick.ts,
            }));
        }
    }
    serde_json::json!({ "trades": trades })
}

async fn gather_pressure_gauge(store: &Store, symbols: &[String]) -> serde_json::Value {
    let mut gauges = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        if let Ok(Some(flow)) = store::order_flow::latest_order_flow(store.pool(), symbol).await {
            gauges.push(serde_json::json!({
                "symbol": flow.symbol,
                "volume_imbalance_ratio": flow.volume_imbalance_ratio,
                "value_imbalance_ratio": flow.value_imbalance_ratio,
                "delta_volume": flow.delta_volume,
                "aggressive_buy_pct": flow.aggressive_buy_pct,
            }));
        }
    }
    serde_json::json!({ "gauges": gauges })
}

async fn gather_whale_alerts(store: &Store) -> serde_json::Value {
    let alerts = store::whale_alerts::recent_alerts(store.pool(), RECENT_ALERTS_LIMIT).await.unwrap_or_default();
    serde_json::json!({ "alerts": alerts })
}

async fn gather_volume_spikes(store: &Store) -> serde_json::Value {
    let since = chrono::Utc::now() - chrono::Duration::minutes(VOLUME_SPIKE_WINDOW_MINUTES);
    let recent = store::whale_alerts::recent_alerts(store.pool(), RECENT_ALERTS_LIMIT).await.unwrap_or_default();
    let spikes: Vec<_> = recent
        .into_iter()
        .filter(|a| a.detected_at >= since && a.alert_type() == AlertType::RapidAccumulation)
        .collect();
    serde_json::json!({ "spikes": spikes })
}

async fn gather_zscore_ranking(store: &Store, symbols: &[String]) -> serde_json::Value {
    let mut ranked = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let Ok(Some(tick)) = store::ticks::latest_tick(store.pool(), symbol).await else { continue };
        let Ok(Some(baseline)) = store::baselines::latest_baseline(store.pool(), symbol).await else { continue };
        if baseline.price_stddev <= f64::EPSILON {
            continue;
        }
        let price_z = (tick.price - baseline.price_mean) / baseline.price_stddev;
        ranked.push(serde_json::json!({ "symbol": symbol, "price_z": price_z }));
    }
    ranked.sort_by(|a, b| {
        let az = a["price_z"].as_f64().unwrap_or(0.0).abs();
        let bz = b["price_z"].as_f64().unwrap_or(0.0).abs();
        bz.partial_cmp(&az).unwrap_or(std::cmp::Ordering::Equal)
    });
    serde_json::json!({ "ranking": ranked })
}

async fn gather_power_candles(store: &Store, symbols: &[String]) -> serde_json::Value {
    let mut ranked = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let Ok(Some(candle)) = store::candles::latest_candle(store.pool(), symbol, POWER_CANDLE_INTERVAL).await else { continue };
        let range = candle.high - candle.low;
        let body_ratio = if range > f64::EPSILON { (candle.close - candle.open).abs() / range } else { 0.0 };
        ranked.push(serde_json::json!({
            "symbol": symbol,
            "body_ratio": body_ratio,
            "open": candle.open,
            "close": candle.close,
            "high": candle.high,
            "low": candle.low,
        }));
    }
    ranked.sort_by(|a, b| {
        let ar = a["body_ratio"].as_f64().unwrap_or(0.0);
        let br = b["body_ratio"].as_f64().unwrap_or(0.0);
        br.partial_cmp(&ar).unwrap_or(std::cmp::Ordering::Equal)
    });
    serde_json::json!({ "candles": ranked })
}

/// Runs until cancelled, publishing all six dashboard streams every
/// `REFRESH_INTERVAL`.
pub async fn run_dashboard_gatherer(store: Arc<Store>, broker: SseBroker, symbols: Vec<String>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("dashboard gatherer cancelled");
                return;
            }
        }

        broker.publish("live_trades", gather_live_trades(&store, &symbols).await);
        broker.publish("pressure_gauge", gather_pressure_gauge(&store, &symbols).await);
        broker.publish("whale_alerts", gather_whale_alerts(&store).await);
        broker.publish("volume_spikes", gather_volume_spikes(&store).await);
        broker.publish("zscore_ranking", gather_zscore_ranking(&store, &symbols).await);
        broker.publish("power_candles", gather_power_candles(&store, &symbols).await);
    }
}
