// =============================================================================
// Candle builder (C1's upstream feed)
// =============================================================================
//
// Every tick that clears the store's duplicate check is folded into the
// 1m/5m/15m/1h/1d candle buckets it falls in, one `upsert_candle` per
// interval. No in-memory OHLC accumulator is kept: `store::candles::upsert_candle`'s
// `ON CONFLICT` clause already does the accumulation (open is set once on
// insert and never overwritten; high/low/close/volumes widen on every
// subsequent call), so a bucket only needs the single incoming trade to
// update correctly. Grounded on the teacher's `market_data/candle_buffer.rs`
// rebucketing idea, moved from an in-process ring buffer to the persisted
// incremental aggregate described in SPEC_FULL §3.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::warn;

use crate::store::models::{CandleRow, TickRow};
use crate::store::{self, Store};

const INTERVALS: [(&str, i64); 5] = [("1m", 1), ("5m", 5), ("15m", 15), ("1h", 60), ("1d", 1440)];

fn truncate(ts: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    if minutes >= 1440 {
        return Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), 0, 0, 0).unwrap();
    }
    let epoch_minutes = ts.timestamp() / 60;
    let bucket_minutes = (epoch_minutes / minutes) * minutes;
    DateTime::<Utc>::from_timestamp(bucket_minutes * 60, 0).unwrap_or(ts)
}

/// Folds one tick into every interval bucket it belongs to. Errors are
/// logged and swallowed per-interval so one failing write does not drop the
/// tick from the others.
pub async fn record_tick(store: &Store, tick: &TickRow) {
    for (interval, minutes) in INTERVALS {
        let bucket = truncate(tick.ts, minutes);
        let row = CandleRow {
            symbol: tick.symbol.clone(),
            bucket,
            interval: interval.to_string(),
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume_shares: tick.volume_shares,
            volume_lots: tick.volume_lots,
            total_value: tick.total_value,
            trade_count: 1,
            dominant_board: tick.board.clone(),
        };

        if let Err(e) = store::candles::upsert_candle(store.pool(), &row).await {
            warn!(symbol = %tick.symbol, interval, error = %e, "candle upsert failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_rounds_down_to_bucket() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 26, 10, 7, 42).unwrap();
        assert_eq!(truncate(ts, 1), Utc.with_ymd_and_hms(2026, 7, 26, 10, 7, 0).unwrap());
        assert_eq!(truncate(ts, 5), Utc.with_ymd_and_hms(2026, 7, 26, 10, 5, 0).unwrap());
        assert_eq!(truncate(ts, 60), Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap());
    }

    #[test]
    fn truncate_daily_bucket_is_midnight() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 26, 23, 59, 0).unwrap();
        assert_eq!(truncate(ts, 1440), Utc.with_ymd_and_hms(2026, 7, 26, 0, 0, 0).unwrap());
    }
}
