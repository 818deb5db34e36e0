// =============================================================================
// Signal Filter Pipeline (C7)
// =============================================================================
//
// An ordered list of stages, each returning a non-negative multiplier and a
// reason; final confidence is the product, clamped to [0,1]. A stage
// returning 0 is a hard reject and short-circuits the rest (SPEC_FULL §4.7).
// Grounded on `smart_filters.rs`'s sequential-evaluate-with-early-return
// shape, adapted from boolean pass/block to the spec's multiplicative model.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};

use crate::config::Config;
use crate::store::models::WhaleAlertRow;
use crate::store::{self, Store};
use crate::types::{Decision, RegimeKind, Side, Strategy};

/// Everything a stage needs to make its decision, gathered once by the
/// caller before the pipeline runs.
pub struct FilterContext<'a> {
    pub store: &'a Store,
    pub config: &'a Config,
    pub symbol: &'a str,
    pub strategy: Strategy,
    pub decision: Decision,
    pub regime: Option<RegimeKind>,
    pub regime_confidence: f64,
    pub vwap: Option<f64>,
    pub price: f64,
    pub volume_z: f64,
    pub trend_aligned: bool,
    pub baseline_calculated_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub confidence: f64,
    pub rejected_stage: Option<String>,
    pub reasons: Vec<String>,
}

impl FilterOutcome {
    pub fn accepted(&self) -> bool {
        self.rejected_stage.is_none()
    }
}

fn regime_filter(regime: Option<RegimeKind>) -> (f64, String) {
    match regime {
        Some(RegimeKind::TrendingUp) => (1.3, "regime TRENDING_UP".to_string()),
        Some(RegimeKind::Ranging) => (0.8, "regime RANGING".to_string()),
        Some(RegimeKind::TrendingDown) => (0.7, "regime TRENDING_DOWN".to_string()),
        Some(RegimeKind::Volatile) => (0.0, "regime VOLATILE".to_string()),
        None => (1.0, "no regime reading yet".to_string()),
    }
}

async fn strategy_performance_filter(ctx: &FilterContext<'_>) -> (f64, String) {
    let perf = match store::signals::strategy_performance(ctx.store.pool(), ctx.strategy, ctx.symbol).await {
        Ok(p) => p,
        Err(e) => return (1.0, format!("strategy performance lookup failed, neutral ({e})")),
    };

    if perf.sample_count < ctx.config.filters.min_strategy_signals {
        return (1.0, format!("only {} samples, not enough data", perf.sample_count));
    }
    if perf.win_rate_pct < ctx.config.filters.low_win_rate_pct {
        return (0.0, format!("win rate {:.1}% below floor", perf.win_rate_pct));
    }
    if let Some(calc_at) = ctx.baseline_calculated_at {
        if ctx.now - calc_at > ChronoDuration::hours(2) {
            return (0.0, "baseline stale beyond 2h".to_string());
        }
    }
    if perf.consecutive_losses >= 3 {
        return (0.0, format!("{} consecutive losses, circuit breaker", perf.consecutive_losses));
    }
    (1.0, format!("win rate {:.1}%, {} consecutive losses", perf.win_rate_pct, perf.consecutive_losses))
}

fn dynamic_confidence_filter(decision: Decision, vwap: Option<f64>, price: f64, volume_z: f64, trend_aligned: bool) -> (f64, String) {
    if decision == Decision::Buy {
        if let Some(vwap) = vwap {
            if price < vwap {
                return (0.0, "BUY below VWAP".to_string());
            }
        }
    }
    if volume_z > 4.0 && trend_aligned {
        return (1.3, format!("volume z={volume_z:.2} trend-aligned"));
    }
    if volume_z < 3.0 {
        return (0.0, format!("volume z={volume_z:.2} below confirmation floor"));
    }
    (1.0, "neutral volume confirmation".to_string())
}

async fn order_flow_filter(ctx: &FilterContext<'_>) -> (f64, String) {
    let latest = store::order_flow::latest_order_flow(ctx.store.pool(), ctx.symbol).await.ok().flatten();

    let recent = latest.filter(|row| ctx.now - row.bucket <= ChronoDuration::minutes(1));
    let Some(row) = recent else {
        return if ctx.config.filters.require_order_flow {
            (0.0, "no order-flow entry within the last minute".to_string())
        } else {
            (1.0, "no recent order-flow entry, filter not required".to_string())
        };
    };

    if ctx.decision != Decision::Buy {
        return (1.0, "non-BUY decision, order-flow filter neutral".to_string());
    }

    let pct = row.aggressive_buy_pct.unwrap_or(0.0);
    if pct >= 70.0 {
        (1.4, format!("aggressive buy {pct:.1}%"))
    } else if pct >= 60.0 {
        (1.25, format!("aggressive buy {pct:.1}%"))
    } else if pct >= ctx.config.filters.aggressive_buy_threshold_pct {
        (1.1, format!("aggressive buy {pct:.1}%"))
    } else if pct < ctx.config.filters.order_flow_buy_threshold_pct {
        (0.0, format!("aggressive buy {pct:.1}% below floor"))
    } else {
        (1.0, format!("aggressive buy {pct:.1}% in neutral band"))
    }
}

fn time_of_day_filter(now: DateTime<Utc>, civil_offset: chrono::FixedOffset) -> (f64, String) {
    let local = now.with_timezone(&civil_offset);
    let t = local.time();

    let blocked = [
        (NaiveTime::from_hms_opt(9, 0, 0).unwrap(), NaiveTime::from_hms_opt(9, 15, 0).unwrap()),
        (NaiveTime::from_hms_opt(11, 30, 0).unwrap(), NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
        (NaiveTime::from_hms_opt(13, 30, 0).unwrap(), NaiveTime::from_hms_opt(13, 45, 0).unwrap()),
    ];
    if blocked.iter().any(|(start, end)| t >= *start && t < *end) {
        return (0.0, format!("blocked window {t}"));
    }

    let prime = (NaiveTime::from_hms_opt(10, 0, 0).unwrap(), NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    if t >= prime.0 && t < prime.1 {
        return (1.25, format!("prime window {t}"));
    }

    let close_fade = (NaiveTime::from_hms_opt(14, 50, 0).unwrap(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
    if t >= close_fade.0 && t < close_fade.1 {
        return (0.7, format!("close-fade window {t}"));
    }

    (1.0, format!("neutral window {t}"))
}

async fn whale_alignment_filter(ctx: &FilterContext<'_>) -> (f64, String) {
    let since = ctx.now - ChronoDuration::minutes(15);
    let alerts: Vec<WhaleAlertRow> = match store::whale_alerts::alerts_since(ctx.store.pool(), ctx.symbol, since).await {
        Ok(a) => a,
        Err(e) => return (1.0, format!("whale lookup failed, neutral ({e})")),
    };

    let buy_count = alerts.iter().filter(|a| a.side() == Side::Buy).count();
    let sell_count = alerts.iter().filter(|a| a.side() == Side::Sell).count();
    let big_buy_count = alerts.iter().filter(|a| a.side() == Side::Buy && a.trigger_value >= 500_000_000.0).count();

    if ctx.decision == Decision::Buy && sell_count >= buy_count + 2 {
        return (0.0, format!("{sell_count} sell whales vs {buy_count} buy whales"));
    }
    if ctx.decision == Decision::Buy && big_buy_count >= 3 {
        return (1.5, format!("{big_buy_count} buy whales >=500M in last 15m"));
    }
    if buy_count > sell_count {
        return (1.3, format!("{buy_count} buy whales vs {sell_count} sell whales"));
    }
    (1.0, format!("{buy_count} buy / {sell_count} sell whales, no alignment edge"))
}

/// Runs the full ordered pipeline, short-circuiting on the first zero
/// multiplier.
pub async fn run_pipeline(initial_confidence: f64, ctx: &FilterContext<'_>) -> FilterOutcome {
    let mut confidence = initial_confidence;
    let mut reasons = Vec::new();

    macro_rules! stage {
        ($name:literal, $mult:expr, $reason:expr) => {{
            reasons.push(format!("{}: {}", $name, $reason));
            if $mult <= 0.0 {
                return FilterOutcome { confidence: 0.0, rejected_stage: Some($name.to_string()), reasons };
            }
            confidence *= $mult;
        }};
    }

    let (m, r) = regime_filter(ctx.regime);
    stage!("RegimeFilter", m, r);

    let (m, r) = strategy_performance_filter(ctx).await;
    stage!("StrategyPerformanceFilter", m, r);

    let (m, r) = dynamic_confidence_filter(ctx.decision, ctx.vwap, ctx.price, ctx.volume_z, ctx.trend_aligned);
    stage!("DynamicConfidenceFilter", m, r);

    let (m, r) = order_flow_filter(ctx).await;
    stage!("OrderFlowFilter", m, r);

    let (m, r) = time_of_day_filter(ctx.now, ctx.config.civil_offset());
    stage!("TimeOfDayFilter", m, r);

    let (m, r) = whale_alignment_filter(ctx).await;
    stage!("WhaleAlignmentFilter", m, r);

    FilterOutcome { confidence: confidence.clamp(0.0, 1.0), rejected_stage: None, reasons }
}

/// SWING classifier companion evaluator (SPEC_FULL §4.7 closing paragraph).
pub fn swing_score(confidence: f64, trend_strength: f64, volume_confirm: f64) -> f64 {
    0.4 * confidence + 0.4 * trend_strength + 0.2 * volume_confirm
}

pub fn is_swing(
    confidence: f64,
    historical_sample_days: i64,
    trend_strength: f64,
    volume_confirm: f64,
    min_confidence: f64,
    min_baseline_days: i64,
) -> bool {
    if confidence < min_confidence || historical_sample_days < min_baseline_days || trend_strength < 0.6 {
        return false;
    }
    swing_score(confidence, trend_strength, volume_confirm) >= 0.65
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn regime_filter_matches_spec_table() {
        let (m, _) = regime_filter(Some(RegimeKind::TrendingUp));
        assert!((m - 1.3).abs() < 1e-9);
        let (m, _) = regime_filter(Some(RegimeKind::Volatile));
        assert_eq!(m, 0.0);
        let (m, _) = regime_filter(None);
        assert_eq!(m, 1.0);
    }

    #[test]
    fn dynamic_confidence_filter_rejects_buy_below_vwap() {
        let (m, _) = dynamic_confidence_filter(Decision::Buy, Some(100.0), 95.0, 5.0, true);
        assert_eq!(m, 0.0);
    }

    #[test]
    fn dynamic_confidence_filter_boosts_trend_aligned_high_volume() {
        let (m, _) = dynamic_confidence_filter(Decision::Buy, Some(100.0), 105.0, 4.5, true);
        assert!((m - 1.3).abs() < 1e-9);
    }

    #[test]
    fn dynamic_confidence_filter_rejects_weak_volume() {
        let (m, _) = dynamic_confidence_filter(Decision::Buy, Some(100.0), 105.0, 2.0, false);
        assert_eq!(m, 0.0);
    }

    #[test]
    fn time_of_day_filter_blocks_open_window() {
        let offset = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2026, 7, 26, 9, 5, 0).unwrap().with_timezone(&Utc);
        let (m, _) = time_of_day_filter(now, offset);
        assert_eq!(m, 0.0);
    }

    #[test]
    fn time_of_day_filter_boosts_prime_window() {
        let offset = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2026, 7, 26, 10, 30, 0).unwrap().with_timezone(&Utc);
        let (m, _) = time_of_day_filter(now, offset);
        assert!((m - 1.25).abs() < 1e-9);
    }

    #[test]
    fn time_of_day_filter_neutral_midday() {
        let offset = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2026, 7, 26, 12, 30, 0).unwrap().with_timezone(&Utc);
        let (m, _) = time_of_day_filter(now, offset);
        assert_eq!(m, 1.0);
    }

    #[test]
    fn swing_score_matches_formula() {
        let s = swing_score(0.8, 0.7, 0.5);
        assert!((s - (0.4 * 0.8 + 0.4 * 0.7 + 0.2 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn is_swing_requires_all_gates() {
        assert!(!is_swing(0.5, 30, 0.8, 0.8, 0.75, 20));
        assert!(!is_swing(0.8, 5, 0.8, 0.8, 0.75, 20));
        assert!(is_swing(0.8, 30, 0.8, 0.8, 0.75, 20));
    }
}
