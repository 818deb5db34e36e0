// =============================================================================
// Outcome persistence (C8) — position lifecycle + admission-guard lookups
// =============================================================================

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{ExitReason, OutcomeStatus};

use super::models::OutcomeRow;

/// Inserts a PENDING outcome row the instant a signal is accepted, before the
/// admission guards decide whether it actually opens a position.
pub async fn insert_pending(
    pool: &PgPool,
    signal_id: Uuid,
    symbol: &str,
    entry_decision: &str,
    trade_class: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO outcomes (signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, mfe, mae, status, trade_class)
           VALUES ($1,$2,NOW(),0,$3,0,0,0,0,'PENDING',$4)"#,
    )
    .bind(signal_id)
    .bind(symbol)
    .bind(entry_decision)
    .bind(trade_class)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

/// Marks a PENDING outcome as SKIPPED (admission guard rejected it) without
/// ever entering a position.
pub async fn mark_skipped(pool: &PgPool, signal_id: Uuid, rejection_reason: &str) -> Result<(), StoreError> {
    sqlx::query("UPDATE outcomes SET status = 'SKIPPED', rejection_reason = $2 WHERE signal_id = $1 AND status = 'PENDING'")
        .bind(signal_id)
        .bind(rejection_reason)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(StoreError::classify)
}

/// Transitions PENDING -> OPEN, stamping the real entry price/ATR and initial
/// trailing-stop level computed by the barrier module.
pub async fn mark_open(
    pool: &PgPool,
    signal_id: Uuid,
    entry_price: f64,
    atr_at_entry: f64,
    trailing_stop_price: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"UPDATE outcomes SET status = 'OPEN', entry_price = $2, atr_at_entry = $3, trailing_stop_price = $4
           WHERE signal_id = $1 AND status = 'PENDING'"#,
    )
    .bind(signal_id)
    .bind(entry_price)
    .bind(atr_at_entry)
    .bind(trailing_stop_price)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

/// Updates the trailing-stop level and MFE/MAE extremes of an open position;
/// called on every polling tick (SPEC_FULL §4.8, ~10s cadence).
pub async fn update_tracking(
    pool: &PgPool,
    signal_id: Uuid,
    trailing_stop_price: f64,
    mfe: f64,
    mae: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE outcomes SET trailing_stop_price = $2, mfe = $3, mae = $4 WHERE signal_id = $1 AND status = 'OPEN'",
    )
    .bind(signal_id)
    .bind(trailing_stop_price)
    .bind(mfe)
    .bind(mae)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

/// Terminal transition OPEN -> {WIN,LOSS,BREAKEVEN}, enforced by
/// `OutcomeStatus::can_transition_to` at the call site (barrier.rs).
#[allow(clippy::too_many_arguments)]
pub async fn close_outcome(
    pool: &PgPool,
    signal_id: Uuid,
    status: OutcomeStatus,
    exit_price: f64,
    exit_reason: ExitReason,
    holding_minutes: f64,
    price_change_pct: f64,
    profit_loss_pct: f64,
    risk_reward_ratio: Option<f64>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"UPDATE outcomes SET
             status = $2, exit_time = NOW(), exit_price = $3, exit_reason = $4,
             holding_minutes = $5, price_change_pct = $6, profit_loss_pct = $7,
             risk_reward_ratio = $8
           WHERE signal_id = $1 AND status = 'OPEN'"#,
    )
    .bind(signal_id)
    .bind(status.to_string())
    .bind(exit_price)
    .bind(exit_reason.to_string())
    .bind(holding_minutes)
    .bind(price_change_pct)
    .bind(profit_loss_pct)
    .bind(risk_reward_ratio)
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(StoreError::classify)
}

pub async fn outcome_by_signal(pool: &PgPool, signal_id: Uuid) -> Result<Option<OutcomeRow>, StoreError> {
    sqlx::query_as::<_, OutcomeRow>(
        "SELECT signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, exit_time, exit_price, exit_reason, holding_minutes, price_change_pct, profit_loss_pct, mfe, mae, risk_reward_ratio, status, trade_class, rejection_reason
         FROM outcomes WHERE signal_id = $1",
    )
    .bind(signal_id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

/// All OPEN positions, polled by the outcome tracker's monitoring loop.
pub async fn open_positions(pool: &PgPool) -> Result<Vec<OutcomeRow>, StoreError> {
    sqlx::query_as::<_, OutcomeRow>(
        "SELECT signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, exit_time, exit_price, exit_reason, holding_minutes, price_change_pct, profit_loss_pct, mfe, mae, risk_reward_ratio, status, trade_class, rejection_reason
         FROM outcomes WHERE status = 'OPEN'",
    )
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)
}

pub async fn open_position_count(pool: &PgPool) -> Result<i64, StoreError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outcomes WHERE status = 'OPEN'")
        .fetch_one(pool)
        .await
        .map_err(StoreError::classify)?;
    Ok(row.0)
}

/// Realized P/L for today (civil date in the caller's offset, passed in as a
/// UTC window) — feeds the daily-loss admission guard.
pub async fn realized_pl_pct_since(pool: &PgPool, since: DateTime<Utc>) -> Result<f64, StoreError> {
    let row: (Option<f64>,) = sqlx::query_as(
        "SELECT SUM(profit_loss_pct) FROM outcomes WHERE exit_time >= $1 AND status IN ('WIN','LOSS','BREAKEVEN')",
    )
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(StoreError::classify)?;
    Ok(row.0.unwrap_or(0.0))
}

/// Consecutive losses across all strategies/symbols today, newest-first —
/// feeds the circuit-breaker admission guard.
pub async fn consecutive_losses_since(pool: &PgPool, since: DateTime<Utc>) -> Result<u32, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT status FROM outcomes WHERE exit_time >= $1 AND status IN ('WIN','LOSS','BREAKEVEN') ORDER BY exit_time DESC",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(StoreError::classify)?;

    let mut count = 0u32;
    for (status,) in &rows {
        if status == "LOSS" {
            count += 1;
        } else {
            break;
        }
    }
    Ok(count)
}

/// Most recent outcome (any status) for a symbol — used by the
/// min-signal-interval admission guard to enforce a cooldown per symbol.
pub async fn last_outcome_for_symbol(pool: &PgPool, symbol: &str) -> Result<Option<OutcomeRow>, StoreError> {
    sqlx::query_as::<_, OutcomeRow>(
        "SELECT signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, exit_time, exit_price, exit_reason, holding_minutes, price_change_pct, profit_loss_pct, mfe, mae, risk_reward_ratio, status, trade_class, rejection_reason
         FROM outcomes WHERE symbol = $1 ORDER BY entry_time DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

pub async fn recent_outcomes(pool: &PgPool, symbol: Option<&str>, limit: i64) -> Result<Vec<OutcomeRow>, StoreError> {
    let rows = match symbol {
        Some(sym) => {
            sqlx::query_as::<_, OutcomeRow>(
                "SELECT signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, exit_time, exit_price, exit_reason, holding_minutes, price_change_pct, profit_loss_pct, mfe, mae, risk_reward_ratio, status, trade_class, rejection_reason
                 FROM outcomes WHERE symbol = $1 ORDER BY entry_time DESC LIMIT $2",
            )
            .bind(sym)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, OutcomeRow>(
                "SELECT signal_id, symbol, entry_time, entry_price, entry_decision, atr_at_entry, trailing_stop_price, exit_time, exit_price, exit_reason, holding_minutes, price_change_pct, profit_loss_pct, mfe, mae, risk_reward_ratio, status, trade_class, rejection_reason
                 FROM outcomes ORDER BY entry_time DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    };
    rows.map_err(StoreError::classify)
}
