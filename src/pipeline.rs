// =============================================================================
// Signal dispatcher (C6 glue)
// =============================================================================
//
// Consumes whale alerts off `WhaleDetector::alert_tx`, gathers the baseline/
// regime/order-flow context each strategy needs, runs the three C6
// strategies, filters every verdict through the C7 pipeline, persists the
// resulting signals, and opens a C8 position for each accepted BUY. Also the
// sole place that re-publishes a `whale_alert` event to C9, since the alert
// channel itself is single-consumer (DESIGN.md, "C9 observes C4 directly").
// Grounded on `app_state.rs`'s pattern of a background task draining an
// unbounded channel and dispatching each item to the rest of the system.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::filters::{self, FilterContext};
use crate::outcome::{self, OpenPositionRequest};
use crate::regime::RegimeDetector;
use crate::signals::{self, StrategyInput};
use crate::sse::SseBroker;
use crate::store::models::{SignalRow, WhaleAlertRow};
use crate::store::{self, Store};
use crate::types::{Decision, TradeClass};
use crate::webhook::{WebhookEvent, WebhookNotifier};

/// Runs until the whale-alert channel closes (the detector dropped, which
/// only happens at shutdown).
pub async fn run_dispatcher(
    store: Arc<Store>,
    config: Arc<Config>,
    cache: Cache,
    regime: Arc<RegimeDetector>,
    broker: SseBroker,
    webhook: Option<WebhookNotifier>,
    paused: Arc<AtomicBool>,
    mut alert_rx: mpsc::UnboundedReceiver<WhaleAlertRow>,
) {
    while let Some(alert) = alert_rx.recv().await {
        broker.publish(
            "whale_alert",
            serde_json::json!({
                "id": alert.id,
                "symbol": alert.symbol,
                "alert_type": alert.alert_type,
                "side": alert.side,
                "trigger_price": alert.trigger_price,
                "trigger_volume_lots": alert.trigger_volume_lots,
                "confidence_score": alert.confidence_score,
            }),
        );

        if let Some(notifier) = &webhook {
            notifier
                .notify(
                    &store,
                    WebhookEvent {
                        name: "whale_alert",
                        symbol: alert.symbol.clone(),
                        alert_type: Some(alert.alert_type()),
                        side: Some(alert.side()),
                        confidence: alert.confidence_score,
                        value: alert.trigger_value,
                        payload: serde_json::json!({
                            "id": alert.id,
                            "symbol": alert.symbol,
                            "alert_type": alert.alert_type,
                            "side": alert.side,
                            "trigger_price": alert.trigger_price,
                            "trigger_volume_lots": alert.trigger_volume_lots,
                            "trigger_value": alert.trigger_value,
                            "confidence_score": alert.confidence_score,
                        }),
                    },
                )
                .await;
        }

        if paused.load(Ordering::Relaxed) {
            debug!(symbol = %alert.symbol, "signal dispatcher: paused, skipping signal generation");
            continue;
        }

        process_alert(&store, &config, &cache, &regime, &broker, alert).await;
    }
    debug!("signal dispatcher: alert channel closed, exiting");
}

async fn process_alert(
    store: &Arc<Store>,
    config: &Arc<Config>,
    cache: &Cache,
    regime: &Arc<RegimeDetector>,
    broker: &SseBroker,
    alert: WhaleAlertRow,
) {
    let baseline = match cache.get_baseline(&alert.symbol).await {
        Some(b) => Some(b),
        None => store::baselines::latest_baseline(store.pool(), &alert.symbol).await.ok().flatten(),
    };

    let regime_state = regime.current_regime(&alert.symbol);
    let vwap = baseline.as_ref().map(|b| b.vwap());

    let (price_z, volume_z, price_change_pct) = match &baseline {
        Some(b) if b.price_stddev > f64::EPSILON && b.volume_stddev > f64::EPSILON => (
            (alert.trigger_price - b.price_mean) / b.price_stddev,
            (alert.trigger_volume_lots - b.volume_mean) / b.volume_stddev,
            (alert.trigger_price - b.price_mean) / b.price_mean * 100.0,
        ),
        _ => (0.0, 0.0, 0.0),
    };

    let input = StrategyInput {
        price_change_pct,
        price_z,
        volume_z,
        // No per-symbol rolling history of the prior tick's volume z-score is
        // threaded through the dispatcher; Mean Reversion's "declining
        // volume" branch degrades to its non-declining path until such
        // history is added.
        prev_volume_z: None,
        price: alert.trigger_price,
        vwap,
        regime: regime_state.as_ref().map(|r| r.kind),
        regime_confidence: regime_state.as_ref().map(|r| r.confidence).unwrap_or(0.0),
        range_breakout_same_direction_recent: false,
    };

    let verdicts = signals::evaluate_all(&input);

    for verdict in verdicts {
        if verdict.decision == Decision::NoTrade {
            continue;
        }

        let trend_aligned = matches!(regime_state.as_ref().map(|r| r.kind), Some(crate::types::RegimeKind::TrendingUp));

        let ctx = FilterContext {
            store,
            config,
            symbol: &alert.symbol,
            strategy: verdict.strategy,
            decision: verdict.decision,
            regime: regime_state.as_ref().map(|r| r.kind),
            regime_confidence: input.regime_confidence,
            vwap,
            price: alert.trigger_price,
            volume_z,
            trend_aligned,
            baseline_calculated_at: baseline.as_ref().map(|b| b.calculated_at),
            now: chrono::Utc::now(),
        };

        let outcome = filters::run_pipeline(verdict.confidence, &ctx).await;

        let trade_class = if outcome.accepted() && verdict.decision == Decision::Buy && config.swing.enabled {
            let historical_sample_days = store::candles::history_span_days(store.pool(), &alert.symbol).await.unwrap_or(0);
            if filters::is_swing(
                outcome.confidence,
                historical_sample_days,
                regime_state.as_ref().map(|r| r.ema_slope_pct.abs() / 2.0).unwrap_or(0.0).min(1.0),
                (volume_z / 5.0).clamp(0.0, 1.0),
                config.swing.min_confidence,
                config.swing.min_baseline_days,
            ) {
                TradeClass::Swing
            } else {
                TradeClass::Day
            }
        } else {
            TradeClass::Day
        };

        let signal_id = uuid::Uuid::new_v4();
        let row = SignalRow {
            id: signal_id,
            generated_at: chrono::Utc::now(),
            symbol: alert.symbol.clone(),
            strategy: verdict.strategy.to_string(),
            decision: verdict.decision.to_string(),
            confidence: outcome.confidence,
            trigger_price: alert.trigger_price,
            trigger_volume_lots: alert.trigger_volume_lots,
            price_z,
            volume_z,
            price_change_pct,
            reason: if outcome.accepted() {
                verdict.reason
            } else {
                format!("{} (rejected at {})", verdict.reason, outcome.rejected_stage.clone().unwrap_or_default())
            },
            regime: regime_state.as_ref().map(|r| r.kind.to_string()),
            whale_alert_id: Some(alert.id),
            analysis_data: Some(serde_json::json!({ "filter_reasons": outcome.reasons })),
            accepted: outcome.accepted(),
            trade_class: if outcome.accepted() && verdict.decision == Decision::Buy { Some(trade_class.to_string()) } else { None },
        };

        if let Err(e) = store::signals::insert_signal(store.pool(), &row).await {
            warn!(symbol = %alert.symbol, error = %e, "failed to persist signal");
            continue;
        }

        if !outcome.accepted() || verdict.decision != Decision::Buy {
            continue;
        }

        info!(symbol = %alert.symbol, strategy = %verdict.strategy, confidence = outcome.confidence, ?trade_class, "signal accepted, opening position");

        let req = OpenPositionRequest { signal_id, symbol: alert.symbol.clone(), trade_class };
        match outcome::try_open(store, config, req).await {
            Ok(true) => broker.publish(
                "position_opened",
                serde_json::json!({ "signal_id": signal_id, "symbol": alert.symbol, "trade_class": trade_class.to_string() }),
            ),
            Ok(false) => debug!(symbol = %alert.symbol, "position not opened (admission guard or no price)"),
            Err(e) => warn!(symbol = %alert.symbol, error = %e, "failed to open position"),
        }
    }
}
