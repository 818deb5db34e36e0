// =============================================================================
// Webhook delivery log
// =============================================================================

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// Records the outcome of one webhook delivery attempt sequence (not one
/// HTTP request — `attempts` is how many were made before giving up or
/// succeeding).
#[allow(clippy::too_many_arguments)]
pub async fn log_delivery(
    pool: &PgPool,
    url: &str,
    event_name: &str,
    symbol: Option<&str>,
    attempts: u32,
    success: bool,
    status_code: Option<u16>,
    error: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO webhook_deliveries (id, sent_at, url, event_name, symbol, attempts, success, status_code, error)
           VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
    )
    .bind(Uuid::new_v4())
    .bind(Utc::now())
    .bind(url)
    .bind(event_name)
    .bind(symbol)
    .bind(attempts as i32)
    .bind(success)
    .bind(status_code.map(|c| c as i32))
    .bind(error)
    .execute(pool)
    .await
    .map_err(StoreError::classify)?;
    Ok(())
}
