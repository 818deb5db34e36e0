// =============================================================================
// Order-flow persistence (C5)
// =============================================================================

use sqlx::PgPool;

use crate::error::StoreError;

use super::models::OrderFlowRow;

pub async fn insert_order_flow_batch(pool: &PgPool, rows: &[OrderFlowRow]) -> Result<(), StoreError> {
    for row in rows {
        sqlx::query(
            r#"INSERT INTO order_flow (symbol, bucket, buy_volume_lots, sell_volume_lots, buy_trade_count, sell_trade_count, buy_value, sell_value, volume_imbalance_ratio, value_imbalance_ratio, delta_volume, aggressive_buy_pct)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
               ON CONFLICT (symbol, bucket) DO NOTHING"#,
        )
        .bind(&row.symbol)
        .bind(row.bucket)
        .bind(row.buy_volume_lots)
        .bind(row.sell_volume_lots)
        .bind(row.buy_trade_count)
        .bind(row.sell_trade_count)
        .bind(row.buy_value)
        .bind(row.sell_value)
        .bind(row.volume_imbalance_ratio)
        .bind(row.value_imbalance_ratio)
        .bind(row.delta_volume)
        .bind(row.aggressive_buy_pct)
        .execute(pool)
        .await
        .map_err(StoreError::classify)?;
    }
    Ok(())
}

/// Only the most recent per-symbol bucket is consulted online by C7
/// (SPEC_FULL §4.5).
pub async fn latest_order_flow(pool: &PgPool, symbol: &str) -> Result<Option<OrderFlowRow>, StoreError> {
    sqlx::query_as::<_, OrderFlowRow>(
        "SELECT symbol, bucket, buy_volume_lots, sell_volume_lots, buy_trade_count, sell_trade_count, buy_value, sell_value, volume_imbalance_ratio, value_imbalance_ratio, delta_volume, aggressive_buy_pct
         FROM order_flow WHERE symbol = $1 ORDER BY bucket DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}
