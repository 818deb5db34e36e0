// =============================================================================
// Baseline Store (C1)
// =============================================================================
//
// A periodic job recomputes per-symbol price/volume/value statistics over
// the trailing 60 minutes of 1-minute candles (SPEC_FULL §4.2). Grounded on
// `runtime_config.rs`'s periodic-recompute timer shape; the stats themselves
// have no teacher analogue since the teacher consumes exchange balances
// directly rather than keeping its own rolling baseline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::store::models::BaselineRow;
use crate::store::{self, Store};
use crate::whale::WhaleDetector;

const LOOKBACK_MINUTES: i64 = 60;
const MIN_SAMPLE_SIZE: usize = 30;
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], m: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Linear-interpolated percentile over an already-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

struct Stats {
    mean: f64,
    stddev: f64,
    median: f64,
    p25: f64,
    p75: f64,
}

fn compute_stats(values: &mut [f64]) -> Stats {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let m = mean(values);
    Stats { mean: m, stddev: stddev(values, m), median: percentile(values, 50.0), p25: percentile(values, 25.0), p75: percentile(values, 75.0) }
}

async fn recompute_one(store: &Store, cache: &Cache, whale: &Arc<WhaleDetector>, symbol: &str) {
    let since = Utc::now() - chrono::Duration::minutes(LOOKBACK_MINUTES);
    let candles = match store::candles::candles_since(store.pool(), symbol, since).await {
        Ok(c) => c,
        Err(e) => {
            warn!(symbol, error = %e, "baseline: failed to load candles");
            return;
        }
    };

    if candles.len() < MIN_SAMPLE_SIZE {
        debug!(symbol, sample_size = candles.len(), "baseline: sample too small to publish");
        return;
    }

    let mut prices: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut volumes: Vec<f64> = candles.iter().map(|c| c.volume_lots).collect();
    let mut values: Vec<f64> = candles.iter().map(|c| c.total_value).collect();

    let price_stats = compute_stats(&mut prices);
    let volume_stats = compute_stats(&mut volumes);
    let value_stats = compute_stats(&mut values);

    let row = BaselineRow {
        symbol: symbol.to_string(),
        calculated_at: Utc::now(),
        lookback_hours: (LOOKBACK_MINUTES / 60).max(1) as i32,
        sample_size: candles.len() as i64,
        price_mean: price_stats.mean,
        price_stddev: price_stats.stddev,
        price_median: price_stats.median,
        price_p25: price_stats.p25,
        price_p75: price_stats.p75,
        volume_mean: volume_stats.mean,
        volume_stddev: volume_stats.stddev,
        volume_median: volume_stats.median,
        volume_p25: volume_stats.p25,
        volume_p75: volume_stats.p75,
        value_mean: value_stats.mean,
        value_stddev: value_stats.stddev,
        value_median: value_stats.median,
        value_p25: value_stats.p25,
        value_p75: value_stats.p75,
    };

    if let Err(e) = store::baselines::insert_baseline(store.pool(), &row).await {
        warn!(symbol, error = %e, "baseline: failed to persist");
        return;
    }

    cache.put_baseline(&row).await;
    whale.set_baseline(row);
}

/// Runs until cancelled, recomputing every configured symbol's baseline on a
/// fixed interval.
pub async fn run_baseline_job(store: Arc<Store>, cache: Cache, whale: Arc<WhaleDetector>, symbols: Vec<String>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("baseline job cancelled");
                return;
            }
        }

        for symbol in &symbols {
            recompute_one(&store, &cache, &whale, symbol).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_matches_known_values() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 50.0) - 2.5).abs() < 1e-9);
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&sorted, 100.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn compute_stats_reports_mean_and_spread() {
        let mut values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let stats = compute_stats(&mut values);
        assert!((stats.mean - 30.0).abs() < 1e-9);
        assert!((stats.median - 30.0).abs() < 1e-9);
        assert!(stats.stddev > 0.0);
    }

    #[test]
    fn single_value_has_zero_stddev() {
        let mut values = vec![42.0];
        let stats = compute_stats(&mut values);
        assert_eq!(stats.stddev, 0.0);
        assert!((stats.median - 42.0).abs() < 1e-9);
    }
}
