// =============================================================================
// Signal persistence (C6/C7)
// =============================================================================

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::Strategy;

use super::models::SignalRow;

pub async fn insert_signal(pool: &PgPool, row: &SignalRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO signals (
            id, generated_at, symbol, strategy, decision, confidence, trigger_price,
            trigger_volume_lots, price_z, volume_z, price_change_pct, reason, regime,
            whale_alert_id, analysis_data, accepted, trade_class
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)"#,
    )
    .bind(row.id)
    .bind(row.generated_at)
    .bind(&row.symbol)
    .bind(&row.strategy)
    .bind(&row.decision)
    .bind(row.confidence)
    .bind(row.trigger_price)
    .bind(row.trigger_volume_lots)
    .bind(row.price_z)
    .bind(row.volume_z)
    .bind(row.price_change_pct)
    .bind(&row.reason)
    .bind(&row.regime)
    .bind(row.whale_alert_id)
    .bind(&row.analysis_data)
    .bind(row.accepted)
    .bind(&row.trade_class)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

pub async fn signal_by_id(pool: &PgPool, id: Uuid) -> Result<Option<SignalRow>, StoreError> {
    sqlx::query_as::<_, SignalRow>(
        "SELECT id, generated_at, symbol, strategy, decision, confidence, trigger_price, trigger_volume_lots, price_z, volume_z, price_change_pct, reason, regime, whale_alert_id, analysis_data, accepted, trade_class
         FROM signals WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

pub async fn recent_signals(pool: &PgPool, symbol: Option<&str>, limit: i64) -> Result<Vec<SignalRow>, StoreError> {
    let rows = match symbol {
        Some(sym) => {
            sqlx::query_as::<_, SignalRow>(
                "SELECT id, generated_at, symbol, strategy, decision, confidence, trigger_price, trigger_volume_lots, price_z, volume_z, price_change_pct, reason, regime, whale_alert_id, analysis_data, accepted, trade_class
                 FROM signals WHERE symbol = $1 ORDER BY generated_at DESC LIMIT $2",
            )
            .bind(sym)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, SignalRow>(
                "SELECT id, generated_at, symbol, strategy, decision, confidence, trigger_price, trigger_volume_lots, price_z, volume_z, price_change_pct, reason, regime, whale_alert_id, analysis_data, accepted, trade_class
                 FROM signals ORDER BY generated_at DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    };
    rows.map_err(StoreError::classify)
}

/// 30-day daily win-rate for (strategy, symbol), consulted by the
/// StrategyPerformanceFilter (C7 stage 2). Joins through `outcomes` since
/// win/loss is only known once a position resolves.
pub async fn strategy_performance(
    pool: &PgPool,
    strategy: Strategy,
    symbol: &str,
) -> Result<StrategyPerformance, StoreError> {
    let since = Utc::now() - chrono::Duration::days(30);
    let row: (i64, i64) = sqlx::query_as(
        r#"SELECT
             COUNT(*) FILTER (WHERE o.status IN ('WIN', 'LOSS', 'BREAKEVEN')) AS total,
             COUNT(*) FILTER (WHERE o.status = 'WIN') AS wins
           FROM signals s
           JOIN outcomes o ON o.signal_id = s.id
           WHERE s.strategy = $1 AND s.symbol = $2 AND s.generated_at >= $3"#,
    )
    .bind(strategy.to_string())
    .bind(symbol)
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(StoreError::classify)?;

    let (total, wins) = row;
    let win_rate_pct = if total > 0 {
        (wins as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    // Consecutive losses: walk the most recent outcomes newest-first until a
    // non-loss is hit.
    let recent: Vec<(String,)> = sqlx::query_as(
        r#"SELECT o.status FROM signals s JOIN outcomes o ON o.signal_id = s.id
           WHERE s.strategy = $1 AND s.symbol = $2 AND o.status IN ('WIN','LOSS','BREAKEVEN')
           ORDER BY o.exit_time DESC LIMIT 10"#,
    )
    .bind(strategy.to_string())
    .bind(symbol)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)?;

    let mut consecutive_losses = 0u32;
    for (status,) in &recent {
        if status == "LOSS" {
            consecutive_losses += 1;
        } else {
            break;
        }
    }

    Ok(StrategyPerformance {
        sample_count: total as u32,
        win_rate_pct,
        consecutive_losses,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyPerformance {
    pub sample_count: u32,
    pub win_rate_pct: f64,
    pub consecutive_losses: u32,
}
