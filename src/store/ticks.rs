// =============================================================================
// Tick persistence (C3 write path)
// =============================================================================

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Board, Side};

use super::models::{board_to_str, TickRow};

/// A normalized tick ready to be written through to the hypertable. This is
/// the boundary type between the external wire decoder (out of scope) and
/// the core pipeline.
#[derive(Debug, Clone)]
pub struct NormalizedTick {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub volume_shares: f64,
    pub board: Board,
    pub trade_number: Option<i64>,
}

impl NormalizedTick {
    pub fn volume_lots(&self) -> f64 {
        (self.volume_shares / 100.0).trunc()
    }

    pub fn total_value(&self) -> f64 {
        self.price * self.volume_shares
    }
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
        Side::Unknown => "UNKNOWN",
    }
}

/// Insert a single tick. A unique-constraint violation on
/// (symbol, trade_number, board, civil_date) is classified as `Duplicate`
/// and must be treated as success by the caller (SPEC_FULL §4.1).
pub async fn insert_tick(pool: &PgPool, tick: &NormalizedTick) -> Result<TickRow, StoreError> {
    let id = Uuid::new_v4();
    let ts = Utc::now();
    let row = TickRow {
        id,
        ts,
        symbol: tick.symbol.clone(),
        side: side_str(tick.side).to_string(),
        price: tick.price,
        volume_shares: tick.volume_shares,
        volume_lots: tick.volume_lots(),
        total_value: tick.total_value(),
        board: board_to_str(tick.board).to_string(),
        trade_number: tick.trade_number,
    };

    let result = sqlx::query(
        r#"INSERT INTO ticks (id, ts, symbol, side, price, volume_shares, volume_lots, total_value, board, trade_number, civil_date)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $2::date)"#,
    )
    .bind(row.id)
    .bind(row.ts)
    .bind(&row.symbol)
    .bind(&row.side)
    .bind(row.price)
    .bind(row.volume_shares)
    .bind(row.volume_lots)
    .bind(row.total_value)
    .bind(&row.board)
    .bind(row.trade_number)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(row),
        Err(e) => Err(StoreError::classify(e)),
    }
}

/// Batched variant: chunked transactional insert of size 100. Inside a
/// chunk, a duplicate-key violation aborts *that chunk* silently (the
/// transaction rolls back) and iteration continues with the next chunk; any
/// other error propagates instead of being swallowed.
///
/// This mirrors SPEC_FULL §4.1's "per-chunk abort on duplicate" contract
/// rather than retrying row-by-row inside the chunk, since per the source
/// the dedup key is expected to be rare within a single feed burst.
pub async fn ingest_batch(pool: &PgPool, ticks: &[NormalizedTick]) -> anyhow::Result<usize> {
    const CHUNK_SIZE: usize = 100;
    let mut inserted = 0usize;

    for chunk in ticks.chunks(CHUNK_SIZE) {
        let mut tx = pool.begin().await?;
        let mut chunk_rows = 0usize;
        let mut duplicate = false;

        for tick in chunk {
            let id = Uuid::new_v4();
            let ts = Utc::now();
            let result = sqlx::query(
                r#"INSERT INTO ticks (id, ts, symbol, side, price, volume_shares, volume_lots, total_value, board, trade_number, civil_date)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $2::date)"#,
            )
            .bind(id)
            .bind(ts)
            .bind(&tick.symbol)
            .bind(side_str(tick.side))
            .bind(tick.price)
            .bind(tick.volume_shares)
            .bind(tick.volume_lots())
            .bind(tick.total_value())
            .bind(board_to_str(tick.board))
            .bind(tick.trade_number)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => chunk_rows += 1,
                Err(e) if StoreError::classify(e).is_duplicate() => {
                    duplicate = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if duplicate {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
            inserted += chunk_rows;
        }
    }

    Ok(inserted)
}

/// Fetch the most recent tick for a symbol — used as the "current price"
/// fallback when the 1-minute candle has not yet refreshed (SPEC_FULL §9).
pub async fn latest_tick(pool: &PgPool, symbol: &str) -> Result<Option<TickRow>, StoreError> {
    sqlx::query_as::<_, TickRow>(
        "SELECT id, ts, symbol, side, price, volume_shares, volume_lots, total_value, board, trade_number
         FROM ticks WHERE symbol = $1 ORDER BY ts DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::classify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_lots_rounds_toward_zero() {
        let t = NormalizedTick {
            symbol: "ABCD".into(),
            side: Side::Buy,
            price: 1000.0,
            volume_shares: 1650.0,
            board: Board::Rg,
            trade_number: Some(1),
        };
        assert!((t.volume_lots() - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_value_is_price_times_shares() {
        let t = NormalizedTick {
            symbol: "ABCD".into(),
            side: Side::Buy,
            price: 1020.0,
            volume_shares: 160_000.0,
            board: Board::Rg,
            trade_number: None,
        };
        assert!((t.total_value() - 163_200_000.0).abs() < 1.0);
    }
}
