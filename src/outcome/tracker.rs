// =============================================================================
// Outcome Tracker (C8)
// =============================================================================
//
// Full position lifecycle: admission guards, PENDING -> OPEN creation, a
// 10-second polling loop that evaluates exit barriers for every open
// position, and the terminal OPEN -> {WIN,LOSS,BREAKEVEN} write. This is the
// single writer of the outcomes table (SPEC_FULL §5). Grounded on
// `exit/monitor.rs`'s periodic-poll-all-open-positions shape and
// `exit/triple_barrier.rs`'s barrier math, now driven by `outcome/barrier.rs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::indicators::atr::calculate_atr;
use crate::outcome::barrier::{classify, BarrierLevels, Classification};
use crate::sse::SseBroker;
use crate::store::models::OutcomeRow;
use crate::store::{self, Store};
use crate::types::{ExitReason, OutcomeStatus, TradeClass};
use crate::webhook::{WebhookEvent, WebhookNotifier};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const MARKET_CLOSE_TIME_HOUR: u32 = 16;
const DAY_MAX_HOLDING_MINUTES: f64 = 240.0;
const DAY_ATR_INTERVAL: &str = "5m";
const SWING_ATR_INTERVAL: &str = "1d";
const ATR_PERIOD: usize = 14;

fn civil_day_start(config: &Config) -> chrono::DateTime<Utc> {
    let local = Utc::now().with_timezone(&config.civil_offset());
    let midnight = local.date_naive().and_hms_opt(0, 0, 0).unwrap();
    config.civil_offset().from_local_datetime(&midnight).unwrap().with_timezone(&Utc)
}

async fn current_price(store: &Store, symbol: &str) -> Option<f64> {
    if let Ok(Some(candle)) = store::candles::latest_candle(store.pool(), symbol, "1m").await {
        return Some(candle.close);
    }
    store::ticks::latest_tick(store.pool(), symbol).await.ok().flatten().map(|t| t.price)
}

async fn atr_for_entry(store: &Store, symbol: &str, trade_class: TradeClass) -> Option<f64> {
    let interval = if trade_class == TradeClass::Swing { SWING_ATR_INTERVAL } else { DAY_ATR_INTERVAL };
    let rows = store::candles::recent_candles(store.pool(), symbol, interval, (ATR_PERIOD as i64) + 1).await.ok()?;
    if rows.is_empty() {
        return None;
    }
    let candles: Vec<crate::market_data::Candle> = rows
        .iter()
        .map(|r| crate::market_data::Candle {
            open_time: r.bucket.timestamp_millis(),
            close_time: r.bucket.timestamp_millis(),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume_shares,
            quote_volume: r.total_value,
            trades_count: r.trade_count.max(0) as u64,
            taker_buy_volume: 0.0,
            taker_buy_quote_volume: 0.0,
            is_closed: true,
        })
        .collect();
    calculate_atr(&candles, ATR_PERIOD)
}

/// Request to open a new position from an accepted, filtered signal.
pub struct OpenPositionRequest {
    pub signal_id: Uuid,
    pub symbol: String,
    pub trade_class: TradeClass,
}

/// Runs the admission guards and, if they pass, creates the position
/// (PENDING -> OPEN). Returns `true` if opened, `false` if an admission
/// guard rejected it (the outcome row is left SKIPPED).
pub async fn try_open(store: &Store, config: &Config, req: OpenPositionRequest) -> anyhow::Result<bool> {
    store::outcomes::insert_pending(store.pool(), req.signal_id, &req.symbol, "BUY", &req.trade_class.to_string()).await?;

    if let Some(reason) = admission_rejection(store, config, &req.symbol).await? {
        store::outcomes::mark_skipped(store.pool(), req.signal_id, &reason).await?;
        debug!(symbol = %req.symbol, reason, "outcome: admission guard rejected");
        return Ok(false);
    }

    let Some(entry_price) = current_price(store, &req.symbol).await else {
        store::outcomes::mark_skipped(store.pool(), req.signal_id, "no current price available").await?;
        return Ok(false);
    };
    let atr = atr_for_entry(store, &req.symbol, req.trade_class).await.unwrap_or(0.0);

    let k_ts = if req.trade_class == TradeClass::Swing { config.swing_multipliers.k_ts } else { config.day_multipliers.k_ts };
    let trailing_stop = entry_price - k_ts * atr;

    store::outcomes::mark_open(store.pool(), req.signal_id, entry_price, atr, trailing_stop).await?;
    info!(symbol = %req.symbol, entry_price, atr, "outcome: position opened");
    Ok(true)
}

async fn admission_rejection(store: &Store, config: &Config, symbol: &str) -> anyhow::Result<Option<String>> {
    let since = civil_day_start(config);

    let realized_pl = store::outcomes::realized_pl_pct_since(store.pool(), since).await?;
    if realized_pl <= -config.risk.max_daily_loss_pct {
        return Ok(Some(format!("daily realized loss {realized_pl:.2}% breaches -{:.2}%", config.risk.max_daily_loss_pct)));
    }

    let consecutive_losses = store::outcomes::consecutive_losses_since(store.pool(), since).await?;
    if consecutive_losses >= config.risk.max_consecutive_losses {
        return Ok(Some(format!("{consecutive_losses} consecutive losses today")));
    }

    let open_count = store::outcomes::open_position_count(store.pool()).await?;
    if open_count >= config.risk.max_open_positions as i64 {
        return Ok(Some(format!("{open_count} open positions at cap")));
    }

    if let Some(last) = store::outcomes::last_outcome_for_symbol(store.pool(), symbol).await? {
        let elapsed_minutes = (Utc::now() - last.entry_time).num_seconds() as f64 / 60.0;
        if elapsed_minutes < config.risk.min_signal_interval_minutes as f64 {
            return Ok(Some(format!("{elapsed_minutes:.1}m since last signal, below {}m cooldown", config.risk.min_signal_interval_minutes)));
        }
    }

    Ok(None)
}

async fn poll_one(store: &Store, config: &Config, broker: &SseBroker, webhook: &Option<WebhookNotifier>, row: &OutcomeRow) {
    let trade_class = row.trade_class();
    let Some(price) = current_price(store, &row.symbol).await else {
        return;
    };

    let atr = row.atr_at_entry;
    let multipliers = if trade_class == TradeClass::Swing { &config.swing_multipliers } else { &config.day_multipliers };
    let mut levels = BarrierLevels::new(row.entry_price, atr, multipliers);
    levels.trailing_stop = row.trailing_stop_price;

    let unrealized_pl_pct = (price - row.entry_price) / row.entry_price * 100.0;
    levels.update_trailing_stop(price, atr, multipliers.k_ts);
    levels.promote_to_breakeven(row.entry_price, unrealized_pl_pct, &config.breakeven);

    let mfe = row.mfe.max(unrealized_pl_pct.max(0.0));
    let mae = row.mae.max((-unrealized_pl_pct).max(0.0));

    let holding_minutes = (Utc::now() - row.entry_time).num_seconds() as f64 / 60.0;
    let max_holding_minutes = if trade_class == TradeClass::Swing {
        (config.swing.max_holding_days * 1440) as f64
    } else {
        DAY_MAX_HOLDING_MINUTES
    };
    let is_market_close = {
        let local = Utc::now().with_timezone(&config.civil_offset());
        local.time() >= NaiveTime::from_hms_opt(MARKET_CLOSE_TIME_HOUR, 0, 0).unwrap()
    };

    let reason = crate::outcome::barrier::evaluate_exit(&levels, row.entry_price, price, trade_class, holding_minutes, max_holding_minutes, is_market_close);

    let Some(reason) = reason else {
        if let Err(e) = store::outcomes::update_tracking(store.pool(), row.signal_id, levels.trailing_stop, mfe, mae).await {
            warn!(symbol = %row.symbol, error = %e, "outcome: tracking update failed");
        }
        return;
    };

    close_position(store, broker, webhook, row, price, reason, holding_minutes).await;
}

async fn close_position(
    store: &Store,
    broker: &SseBroker,
    webhook: &Option<WebhookNotifier>,
    row: &OutcomeRow,
    exit_price: f64,
    reason: ExitReason,
    holding_minutes: f64,
) {
    let price_change_pct = (exit_price - row.entry_price) / row.entry_price * 100.0;
    let profit_loss_pct = price_change_pct;
    let risk_reward_ratio = if row.entry_price > row.trailing_stop_price {
        Some((exit_price - row.entry_price).abs() / (row.entry_price - row.trailing_stop_price).abs())
    } else {
        None
    };

    let status = match classify(profit_loss_pct) {
        Classification::Win => OutcomeStatus::Win,
        Classification::Loss => OutcomeStatus::Loss,
        Classification::Breakeven => OutcomeStatus::Breakeven,
    };

    if let Err(e) = store::outcomes::close_outcome(
        store.pool(),
        row.signal_id,
        status,
        exit_price,
        reason,
        holding_minutes,
        price_change_pct,
        profit_loss_pct,
        risk_reward_ratio,
    )
    .await
    {
        warn!(symbol = %row.symbol, error = %e, "outcome: close failed");
        return;
    }

    info!(symbol = %row.symbol, ?status, ?reason, profit_loss_pct, "outcome: position closed");

    let payload = serde_json::json!({
        "signal_id": row.signal_id,
        "symbol": row.symbol,
        "status": status.to_string(),
        "exit_reason": reason.to_string(),
        "profit_loss_pct": profit_loss_pct,
    });

    broker.publish("position_closed", payload.clone());

    if let Some(notifier) = webhook {
        notifier
            .notify(
                store,
                WebhookEvent {
                    name: "position_closed",
                    symbol: row.symbol.clone(),
                    alert_type: None,
                    side: None,
                    confidence: 0.0,
                    value: profit_loss_pct,
                    payload,
                },
            )
            .await;
    }
}

/// Polls every OPEN position every 10 seconds until cancelled.
pub async fn run_outcome_poller(
    store: Arc<Store>,
    config: Arc<Config>,
    broker: SseBroker,
    webhook: Option<WebhookNotifier>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("outcome poller cancelled");
                return;
            }
        }

        let open = match store::outcomes::open_positions(store.pool()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "outcome: failed to load open positions");
                continue;
            }
        };

        for row in &open {
            poll_one(&store, &config, &broker, &webhook, row).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_day_start_is_midnight_local() {
        let config = Config {
            feed_url: String::new(),
            feed_auth_url: String::new(),
            database_url: String::new(),
            redis_url: String::new(),
            server_port: 0,
            admin_token: String::new(),
            civil_timezone_offset_hours: 7,
            webhook_url: None,
            symbols: vec![],
            filters: Default::default(),
            risk: Default::default(),
            day_multipliers: crate::config::AtrMultipliers { k_sl: 1.5, k_tp1: 3.0, k_tp2: 6.0, k_ts: 1.5 },
            swing_multipliers: crate::config::AtrMultipliers { k_sl: 4.5, k_tp1: 9.0, k_tp2: 18.0, k_ts: 3.0 },
            breakeven: crate::config::BreakevenConfig { trigger_pct: 1.0, buffer_pct: 0.15 },
            swing: Default::default(),
        };
        let start = civil_day_start(&config);
        let local = start.with_timezone(&config.civil_offset());
        assert_eq!(local.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }
}
