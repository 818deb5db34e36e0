// =============================================================================
// Redis read-through cache — hot baselines only (SPEC_FULL §3.1)
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::store::models::BaselineRow;

/// Thin, cheap-to-clone handle around a single multiplexed connection.
#[derive(Clone)]
pub struct Cache {
    manager: Arc<ConnectionManager>,
}

impl Cache {
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager: Arc::new(manager) })
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: usize) -> Result<(), RedisError> {
        let mut con = self.manager.as_ref().clone();
        let payload = serde_json::to_string(value)
            .map_err(|e| RedisError::from((redis::ErrorKind::TypeError, "serde", e.to_string())))?;
        let started = Instant::now();
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut con)
            .await?;
        debug!(key, elapsed = ?started.elapsed(), "cache SET");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RedisError> {
        let mut con = self.manager.as_ref().clone();
        let started = Instant::now();
        let raw: Option<String> = con.get(key).await?;
        debug!(key, elapsed = ?started.elapsed(), "cache GET");
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).map_err(|e| {
                RedisError::from((redis::ErrorKind::TypeError, "serde", e.to_string()))
            })?)),
            None => Ok(None),
        }
    }

    fn baseline_key(symbol: &str) -> String {
        format!("baseline:{symbol}")
    }

    /// Reads the cached baseline for a symbol, falling through to `None` on
    /// any connection error rather than failing the caller — a cache miss is
    /// always safe, it just forces a recompute.
    pub async fn get_baseline(&self, symbol: &str) -> Option<BaselineRow> {
        match self.get_json(&Self::baseline_key(symbol)).await {
            Ok(v) => v,
            Err(e) => {
                debug!(symbol, error = %e, "baseline cache read failed");
                None
            }
        }
    }

    /// Caches a freshly computed baseline for up to 5 minutes (SPEC_FULL §3.1).
    pub async fn put_baseline(&self, row: &BaselineRow) {
        const TTL_SECS: usize = 300;
        if let Err(e) = self.set_json(&Self::baseline_key(&row.symbol), row, TTL_SECS).await {
            debug!(symbol = %row.symbol, error = %e, "baseline cache write failed");
        }
    }
}
