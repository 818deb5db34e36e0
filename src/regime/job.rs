// =============================================================================
// Regime Classifier periodic job (C2)
// =============================================================================
//
// Runs the classifier on 5-minute candles per symbol on a fixed timer,
// persists the result, and pushes the symbol's ATR% into the whale
// detector's in-memory volatility map (SPEC_FULL §4.4's adaptive threshold
// needs it on the hot ingest path without doing I/O there).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::indicators::atr::calculate_atr_pct;
use crate::market_data::Candle;
use crate::regime::RegimeDetector;
use crate::store::models::{CandleRow, RegimeRow};
use crate::store::{self, Store};
use crate::whale::WhaleDetector;

const CANDLE_INTERVAL: &str = "5m";
const CANDLE_LOOKBACK: i64 = 60;
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

fn to_candle(row: &CandleRow) -> Candle {
    Candle {
        open_time: row.bucket.timestamp_millis(),
        close_time: row.bucket.timestamp_millis(),
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume_shares,
        quote_volume: row.total_value,
        trades_count: row.trade_count.max(0) as u64,
        taker_buy_volume: 0.0,
        taker_buy_quote_volume: 0.0,
        is_closed: true,
    }
}

async fn recompute_one(store: &Store, detector: &Arc<RegimeDetector>, whale: &Arc<WhaleDetector>, symbol: &str) {
    let rows = match store::candles::recent_candles(store.pool(), symbol, CANDLE_INTERVAL, CANDLE_LOOKBACK).await {
        Ok(r) => r,
        Err(e) => {
            warn!(symbol, error = %e, "regime: failed to load candles");
            return;
        }
    };

    if rows.is_empty() {
        return;
    }

    let candles: Vec<Candle> = rows.iter().map(to_candle).collect();
    let Some(state) = detector.update(symbol, &candles) else {
        return;
    };

    // ATR(14) absolute on the same 5m series, used as a direct volatility
    // signal by the whale detector (independent of the classifier's own
    // ATR% reading, which may be defaulted when under-sampled).
    if let Some(atr_pct) = calculate_atr_pct(&candles, 14) {
        whale.set_volatility(symbol, atr_pct);
    }

    let row = RegimeRow {
        symbol: symbol.to_string(),
        detected_at: Utc::now(),
        regime: state.kind.to_string(),
        confidence: state.confidence,
        atr: state.atr,
        ema_slope_pct: state.ema_slope_pct,
        volatility_pct: state.volatility_pct,
        price_change_pct: state.price_change_pct,
        sample_insufficient: state.sample_insufficient,
    };

    if let Err(e) = store::regimes::insert_regime(store.pool(), &row).await {
        warn!(symbol, error = %e, "regime: failed to persist");
    }
}

pub async fn run_regime_job(store: Arc<Store>, detector: Arc<RegimeDetector>, whale: Arc<WhaleDetector>, symbols: Vec<String>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("regime job cancelled");
                return;
            }
        }

        for symbol in &symbols {
            recompute_one(&store, &detector, &whale, symbol).await;
        }
    }
}
