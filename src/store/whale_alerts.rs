// =============================================================================
// Whale-alert persistence (C4)
// =============================================================================

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

use super::models::WhaleAlertRow;

pub async fn insert_whale_alert(pool: &PgPool, row: &WhaleAlertRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO whale_alerts (
            id, detected_at, symbol, alert_type, side, trigger_price, trigger_volume_lots,
            trigger_value, pattern_trade_count, z_score, volume_vs_avg_pct, avg_price,
            confidence_score, adaptive_threshold, volatility_pct, board
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)"#,
    )
    .bind(row.id)
    .bind(row.detected_at)
    .bind(&row.symbol)
    .bind(&row.alert_type)
    .bind(&row.side)
    .bind(row.trigger_price)
    .bind(row.trigger_volume_lots)
    .bind(row.trigger_value)
    .bind(row.pattern_trade_count)
    .bind(row.z_score)
    .bind(row.volume_vs_avg_pct)
    .bind(row.avg_price)
    .bind(row.confidence_score)
    .bind(row.adaptive_threshold)
    .bind(row.volatility_pct)
    .bind(&row.board)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

pub async fn alert_by_id(pool: &PgPool, id: Uuid) -> Result<Option<WhaleAlertRow>, StoreError> {
    sqlx::query_as::<_, WhaleAlertRow>(
        "SELECT id, detected_at, symbol, alert_type, side, trigger_price, trigger_volume_lots, trigger_value, pattern_trade_count, z_score, volume_vs_avg_pct, avg_price, confidence_score, adaptive_threshold, volatility_pct, board
         FROM whale_alerts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

/// Whale alerts for a symbol detected since `since` — used by the
/// WhaleAlignmentFilter (C7 stage 6), which counts whales in the last
/// 15 minutes.
pub async fn alerts_since(
    pool: &PgPool,
    symbol: &str,
    since: DateTime<Utc>,
) -> Result<Vec<WhaleAlertRow>, StoreError> {
    sqlx::query_as::<_, WhaleAlertRow>(
        "SELECT id, detected_at, symbol, alert_type, side, trigger_price, trigger_volume_lots, trigger_value, pattern_trade_count, z_score, volume_vs_avg_pct, avg_price, confidence_score, adaptive_threshold, volatility_pct, board
         FROM whale_alerts WHERE symbol = $1 AND detected_at >= $2 ORDER BY detected_at ASC",
    )
    .bind(symbol)
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)
}

/// All symbols that had a whale alert, newest first — convenience helper for
/// the SSE broker / REST surface.
pub async fn recent_alerts(pool: &PgPool, limit: i64) -> Result<Vec<WhaleAlertRow>, StoreError> {
    sqlx::query_as::<_, WhaleAlertRow>(
        "SELECT id, detected_at, symbol, alert_type, side, trigger_price, trigger_volume_lots, trigger_value, pattern_trade_count, z_score, volume_vs_avg_pct, avg_price, confidence_score, adaptive_threshold, volatility_pct, board
         FROM whale_alerts ORDER BY detected_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)
}

/// Same as `recent_alerts`, optionally narrowed to one symbol — the REST
/// surface's `/api/v1/whale-alerts?symbol=...` filter.
pub async fn recent_alerts_for_symbol(pool: &PgPool, symbol: Option<&str>, limit: i64) -> Result<Vec<WhaleAlertRow>, StoreError> {
    let rows = match symbol {
        Some(sym) => {
            sqlx::query_as::<_, WhaleAlertRow>(
                "SELECT id, detected_at, symbol, alert_type, side, trigger_price, trigger_volume_lots, trigger_value, pattern_trade_count, z_score, volume_vs_avg_pct, avg_price, confidence_score, adaptive_threshold, volatility_pct, board
                 FROM whale_alerts WHERE symbol = $1 ORDER BY detected_at DESC LIMIT $2",
            )
            .bind(sym)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => return recent_alerts(pool, limit).await,
    };
    rows.map_err(StoreError::classify)
}
