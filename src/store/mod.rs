// =============================================================================
// Persistence layer — thin Postgres-backed store over the §3 data model
// =============================================================================
//
// Every query is written against the runtime `sqlx::query_as` API bound to
// `#[derive(FromRow)]` structs in `models.rs`, rather than the `query_as!`
// compile-time macros, since there is no live database to check them against
// at build time (see DESIGN.md, "Persistence").

pub mod baselines;
pub mod candles;
pub mod migrations;
pub mod models;
pub mod order_flow;
pub mod outcomes;
pub mod regimes;
pub mod retention;
pub mod signals;
pub mod ticks;
pub mod webhook;
pub mod whale_alerts;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle to the connection pool, passed around the app as `Arc<Store>`.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        migrations::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
