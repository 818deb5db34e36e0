// =============================================================================
// Order-Flow Aggregator (C5)
// =============================================================================
//
// In-memory minute-bucketed accumulator, grounded on
// `market_data/candle_buffer.rs`'s `RwLock<HashMap<_, _>>` buffer shape but
// swapped out wholesale every minute rather than trimmed incrementally: a
// ticker fires on the minute boundary, the live map is replaced with an empty
// one under a single lock acquisition, and the drained batch is persisted
// off-lock (SPEC_FULL §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::models::{OrderFlowRow, TickRow};
use crate::store::{self, Store};
use crate::types::Side;

#[derive(Debug, Clone, Default)]
struct Bucket {
    buy_volume_lots: f64,
    sell_volume_lots: f64,
    buy_trade_count: i64,
    sell_trade_count: i64,
    buy_value: f64,
    sell_value: f64,
}

impl Bucket {
    fn record(&mut self, side: Side, volume_lots: f64, value: f64) {
        match side {
            Side::Buy => {
                self.buy_volume_lots += volume_lots;
                self.buy_value += value;
                self.buy_trade_count += 1;
            }
            Side::Sell => {
                self.sell_volume_lots += volume_lots;
                self.sell_value += value;
                self.sell_trade_count += 1;
            }
            Side::Unknown => {}
        }
    }

    fn into_row(self, symbol: String, bucket: DateTime<Utc>) -> OrderFlowRow {
        let total_volume = self.buy_volume_lots + self.sell_volume_lots;
        let total_value = self.buy_value + self.sell_value;
        let total_trades = self.buy_trade_count + self.sell_trade_count;
        let volume_imbalance_ratio = if total_volume > f64::EPSILON {
            (self.buy_volume_lots - self.sell_volume_lots) / total_volume
        } else {
            0.0
        };
        let value_imbalance_ratio = if total_value > f64::EPSILON {
            (self.buy_value - self.sell_value) / total_value
        } else {
            0.0
        };
        let aggressive_buy_pct = if total_trades > 0 {
            Some(self.buy_trade_count as f64 / total_trades as f64 * 100.0)
        } else {
            None
        };

        OrderFlowRow {
            symbol,
            bucket,
            buy_volume_lots: self.buy_volume_lots,
            sell_volume_lots: self.sell_volume_lots,
            buy_trade_count: self.buy_trade_count,
            sell_trade_count: self.sell_trade_count,
            buy_value: self.buy_value,
            sell_value: self.sell_value,
            volume_imbalance_ratio,
            value_imbalance_ratio,
            delta_volume: self.buy_volume_lots - self.sell_volume_lots,
            aggressive_buy_pct,
        }
    }
}

fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

pub struct OrderFlowAggregator {
    store: Arc<Store>,
    current: Mutex<HashMap<String, Bucket>>,
}

impl OrderFlowAggregator {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self { store, current: Mutex::new(HashMap::new()) })
    }

    /// Synchronous accumulation entry point, called from the ingest thread
    /// right alongside the whale detector.
    pub fn on_tick(&self, tick: &TickRow) {
        let mut guard = self.current.lock();
        guard.entry(tick.symbol.clone()).or_default().record(tick.side(), tick.volume_lots, tick.total_value);
    }

    /// Runs until cancelled, flushing the accumulated buckets every minute
    /// boundary. Spawned once from `main.rs` alongside the other background
    /// jobs.
    pub async fn run_flush_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let next_minute = floor_to_minute(now) + ChronoDuration::minutes(1);
            let wait = (next_minute - now).to_std().unwrap_or(std::time::Duration::from_secs(1));

            tokio::select! {
                _ = time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    debug!("order-flow flush loop cancelled");
                    return;
                }
            }

            self.flush(floor_to_minute(Utc::now()) - ChronoDuration::minutes(1)).await;
        }
    }

    async fn flush(&self, bucket_ts: DateTime<Utc>) {
        let drained: HashMap<String, Bucket> = std::mem::take(&mut *self.current.lock());
        if drained.is_empty() {
            return;
        }

        let rows: Vec<OrderFlowRow> = drained.into_iter().map(|(symbol, bucket)| bucket.into_row(symbol, bucket_ts)).collect();

        if let Err(e) = store::order_flow::insert_order_flow_batch(self.store.pool(), &rows).await {
            warn!(error = %e, bucket = %bucket_ts, "failed to persist order-flow batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_computes_imbalance_ratios() {
        let mut b = Bucket::default();
        b.record(Side::Buy, 100.0, 1_000_000.0);
        b.record(Side::Buy, 50.0, 500_000.0);
        b.record(Side::Sell, 50.0, 500_000.0);

        let row = b.into_row("ABCD".into(), Utc::now());
        assert!((row.volume_imbalance_ratio - 0.5).abs() < 1e-9);
        assert!((row.value_imbalance_ratio - 0.5).abs() < 1e-9);
        assert!((row.delta_volume - 100.0).abs() < 1e-9);
        assert_eq!(row.buy_trade_count, 2);
        assert_eq!(row.sell_trade_count, 1);
    }

    #[test]
    fn empty_bucket_has_zero_ratios_not_nan() {
        let row = Bucket::default().into_row("ABCD".into(), Utc::now());
        assert_eq!(row.volume_imbalance_ratio, 0.0);
        assert_eq!(row.value_imbalance_ratio, 0.0);
        assert!(row.aggressive_buy_pct.is_none());
    }
}
