// =============================================================================
// Candle persistence — 1-min continuous aggregate + derived rollups
// =============================================================================

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreError;

use super::models::CandleRow;

/// Upsert a candle bucket. Candles are maintained incrementally: repeated
/// calls for the same (symbol, bucket, interval) overwrite the prior values
/// as new trades arrive within the same minute.
pub async fn upsert_candle(pool: &PgPool, row: &CandleRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO candles (symbol, bucket, interval, open, high, low, close, volume_shares, volume_lots, total_value, trade_count, dominant_board)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
           ON CONFLICT (symbol, bucket, interval) DO UPDATE SET
             high = GREATEST(candles.high, EXCLUDED.high),
             low = LEAST(candles.low, EXCLUDED.low),
             close = EXCLUDED.close,
             volume_shares = candles.volume_shares + EXCLUDED.volume_shares,
             volume_lots = candles.volume_lots + EXCLUDED.volume_lots,
             total_value = candles.total_value + EXCLUDED.total_value,
             trade_count = candles.trade_count + EXCLUDED.trade_count"#,
    )
    .bind(&row.symbol)
    .bind(row.bucket)
    .bind(&row.interval)
    .bind(row.open)
    .bind(row.high)
    .bind(row.low)
    .bind(row.close)
    .bind(row.volume_shares)
    .bind(row.volume_lots)
    .bind(row.total_value)
    .bind(row.trade_count)
    .bind(&row.dominant_board)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

/// Most recent closed candle for (symbol, interval) — used as the primary
/// "current price" source, per SPEC_FULL §9 ("fall back to latest raw tick
/// only when this is absent").
pub async fn latest_candle(
    pool: &PgPool,
    symbol: &str,
    interval: &str,
) -> Result<Option<CandleRow>, StoreError> {
    sqlx::query_as::<_, CandleRow>(
        "SELECT symbol, bucket, interval, open, high, low, close, volume_shares, volume_lots, total_value, trade_count, dominant_board
         FROM candles WHERE symbol = $1 AND interval = $2 ORDER BY bucket DESC LIMIT 1",
    )
    .bind(symbol)
    .bind(interval)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

/// The last `limit` candles for (symbol, interval), oldest first — used by
/// the regime classifier and ATR computation.
pub async fn recent_candles(
    pool: &PgPool,
    symbol: &str,
    interval: &str,
    limit: i64,
) -> Result<Vec<CandleRow>, StoreError> {
    let mut rows = sqlx::query_as::<_, CandleRow>(
        "SELECT symbol, bucket, interval, open, high, low, close, volume_shares, volume_lots, total_value, trade_count, dominant_board
         FROM candles WHERE symbol = $1 AND interval = $2 ORDER BY bucket DESC LIMIT $3",
    )
    .bind(symbol)
    .bind(interval)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)?;
    rows.reverse();
    Ok(rows)
}

/// Number of calendar days since the symbol's earliest `1d` candle bucket —
/// the actual span of historical samples available, used to gate SWING
/// classification (SPEC_FULL §4.7: "≥ 20 calendar days of historical
/// samples exist for the symbol"). Zero if the symbol has no daily candles
/// yet.
pub async fn history_span_days(pool: &PgPool, symbol: &str) -> Result<i64, StoreError> {
    let earliest: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT MIN(bucket) FROM candles WHERE symbol = $1 AND interval = '1d'")
            .bind(symbol)
            .fetch_one(pool)
            .await
            .map_err(StoreError::classify)?;

    Ok(earliest.map(|ts| (Utc::now() - ts).num_days()).unwrap_or(0))
}

/// Candles within the last 60 minutes for a symbol, used by the Baseline
/// Store's periodic recompute job (SPEC_FULL §4.2).
pub async fn candles_since(
    pool: &PgPool,
    symbol: &str,
    since: DateTime<Utc>,
) -> Result<Vec<CandleRow>, StoreError> {
    sqlx::query_as::<_, CandleRow>(
        "SELECT symbol, bucket, interval, open, high, low, close, volume_shares, volume_lots, total_value, trade_count, dominant_board
         FROM candles WHERE symbol = $1 AND interval = '1m' AND bucket >= $2 ORDER BY bucket ASC",
    )
    .bind(symbol)
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)
}
