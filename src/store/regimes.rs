// =============================================================================
// Regime persistence (C2)
// =============================================================================

use sqlx::PgPool;

use crate::error::StoreError;

use super::models::RegimeRow;

pub async fn insert_regime(pool: &PgPool, row: &RegimeRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO regimes (symbol, detected_at, regime, confidence, atr, ema_slope_pct, volatility_pct, price_change_pct, sample_insufficient)
           VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
    )
    .bind(&row.symbol)
    .bind(row.detected_at)
    .bind(&row.regime)
    .bind(row.confidence)
    .bind(row.atr)
    .bind(row.ema_slope_pct)
    .bind(row.volatility_pct)
    .bind(row.price_change_pct)
    .bind(row.sample_insufficient)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

pub async fn latest_regime(pool: &PgPool, symbol: &str) -> Result<Option<RegimeRow>, StoreError> {
    sqlx::query_as::<_, RegimeRow>(
        "SELECT symbol, detected_at, regime, confidence, atr, ema_slope_pct, volatility_pct, price_change_pct, sample_insufficient
         FROM regimes WHERE symbol = $1 ORDER BY detected_at DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

/// Majority regime across symbols active in the last 24h (SPEC_FULL §3,
/// "aggregate market-level regime").
pub async fn majority_regime_last_24h(pool: &PgPool) -> Result<Option<String>, StoreError> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"SELECT regime FROM (
             SELECT DISTINCT ON (symbol) symbol, regime, detected_at
             FROM regimes WHERE detected_at >= NOW() - INTERVAL '24 hours'
             ORDER BY symbol, detected_at DESC
           ) latest
           GROUP BY regime ORDER BY COUNT(*) DESC LIMIT 1"#,
    )
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)?;
    Ok(row.map(|(r,)| r))
}
