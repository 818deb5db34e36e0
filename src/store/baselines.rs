// =============================================================================
// Baseline persistence (C1)
// =============================================================================

use sqlx::PgPool;

use crate::error::StoreError;

use super::models::BaselineRow;

pub async fn insert_baseline(pool: &PgPool, row: &BaselineRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO baselines (
            symbol, calculated_at, lookback_hours, sample_size,
            price_mean, price_stddev, price_median, price_p25, price_p75,
            volume_mean, volume_stddev, volume_median, volume_p25, volume_p75,
            value_mean, value_stddev, value_median, value_p25, value_p75
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)"#,
    )
    .bind(&row.symbol)
    .bind(row.calculated_at)
    .bind(row.lookback_hours)
    .bind(row.sample_size)
    .bind(row.price_mean)
    .bind(row.price_stddev)
    .bind(row.price_median)
    .bind(row.price_p25)
    .bind(row.price_p75)
    .bind(row.volume_mean)
    .bind(row.volume_stddev)
    .bind(row.volume_median)
    .bind(row.volume_p25)
    .bind(row.volume_p75)
    .bind(row.value_mean)
    .bind(row.value_stddev)
    .bind(row.value_median)
    .bind(row.value_p25)
    .bind(row.value_p75)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

/// Only the latest row per symbol is consulted online (SPEC_FULL §3).
pub async fn latest_baseline(pool: &PgPool, symbol: &str) -> Result<Option<BaselineRow>, StoreError> {
    sqlx::query_as::<_, BaselineRow>(
        "SELECT symbol, calculated_at, lookback_hours, sample_size,
                price_mean, price_stddev, price_median, price_p25, price_p75,
                volume_mean, volume_stddev, volume_median, volume_p25, volume_p75,
                value_mean, value_stddev, value_median, value_p25, value_p75
         FROM baselines WHERE symbol = $1 ORDER BY calculated_at DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}
