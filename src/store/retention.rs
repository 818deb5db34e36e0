// =============================================================================
// Retention sweeps — periodic deletes per entity (SPEC_FULL §3)
// =============================================================================

use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::StoreError;

struct Sweep {
    table: &'static str,
    time_column: &'static str,
    max_age_days: i64,
}

const SWEEPS: &[Sweep] = &[
    Sweep { table: "ticks", time_column: "ts", max_age_days: 90 },
    Sweep { table: "candles", time_column: "bucket", max_age_days: 90 },
    Sweep { table: "whale_alerts", time_column: "detected_at", max_age_days: 365 },
    Sweep { table: "signals", time_column: "generated_at", max_age_days: 730 },
    Sweep { table: "outcomes", time_column: "entry_time", max_age_days: 730 },
    Sweep { table: "baselines", time_column: "calculated_at", max_age_days: 90 },
    Sweep { table: "regimes", time_column: "detected_at", max_age_days: 180 },
];

/// Deletes rows older than each entity's retention window. Run once on a
/// daily timer; a single failing table does not stop the others.
pub async fn run_sweep(pool: &PgPool) -> Result<(), StoreError> {
    for sweep in SWEEPS {
        let sql = format!(
            "DELETE FROM {} WHERE {} < NOW() - INTERVAL '{} days'",
            sweep.table, sweep.time_column, sweep.max_age_days
        );
        match sqlx::query(&sql).execute(pool).await {
            Ok(result) => {
                info!(table = sweep.table, rows_deleted = result.rows_affected(), "retention sweep");
            }
            Err(e) => {
                warn!(table = sweep.table, error = %e, "retention sweep failed");
            }
        }
    }
    Ok(())
}
