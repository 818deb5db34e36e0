// =============================================================================
// Signal Generator (C6)
// =============================================================================
//
// Three independent strategies evaluate the same incoming whale alert plus
// cached baseline/regime/order-flow context and each produce a
// `{decision, confidence, reason}` (SPEC_FULL §4.6). Grounded on the
// teacher's `strategy.rs` for the overall gather-indicators-then-verdict
// shape; the formulas themselves come directly from the spec, not the
// teacher's weighted ensemble (superseded, see DESIGN.md).
//
// The decision vocabulary is long-only ({BUY, WAIT, NO_TRADE} — no SELL),
// per the data model in SPEC_FULL §3: only BUY ever seeds a position. Mean
// Reversion's "extreme-overbought" case has no actionable decision under
// this vocabulary, so it reports NO_TRADE at the strength the spec's SELL
// branch would have carried, leaving the reason/confidence on record for
// analysis without implying a short the system cannot take.

use crate::types::{Decision, RegimeKind, Strategy};

/// Everything the three strategies need, already resolved from the cache/
/// store by the caller.
#[derive(Debug, Clone)]
pub struct StrategyInput {
    pub price_change_pct: f64,
    pub price_z: f64,
    pub volume_z: f64,
    pub prev_volume_z: Option<f64>,
    pub price: f64,
    pub vwap: Option<f64>,
    pub regime: Option<RegimeKind>,
    pub regime_confidence: f64,
    pub range_breakout_same_direction_recent: bool,
}

#[derive(Debug, Clone)]
pub struct StrategyVerdict {

    pub strategy: Strategy,
    pub decision: Decision,
    pub confidence: f64,
    pub reason: String,
}

/// Linearly interpolates `x` from `[x0, x1]` to `[y0, y1]`, clamped to the
/// output range regardless of orientation.
fn interp(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    let t = (x - x0) / (x1 - x0);
    let lo = y0.min(y1);
    let hi = y0.max(y1);
    (y0 + t * (y1 - y0)).clamp(lo, hi)
}

fn above_vwap(price: f64, vwap: Option<f64>) -> bool {
    vwap.map(|v| price > v).unwrap_or(false)
}

fn volume_breakout(input: &StrategyInput) -> StrategyVerdict {
    let strategy = Strategy::VolumeBreakout;
    if input.price_change_pct > 2.0 && input.volume_z > 3.0 {
        if above_vwap(input.price, input.vwap) {
            let confidence = interp(input.volume_z, 3.0, 0.0, 6.0, 1.0);
            return StrategyVerdict {
                strategy,
                decision: Decision::Buy,
                confidence,
                reason: format!("price +{:.2}% with volume z={:.2} above VWAP", input.price_change_pct, input.volume_z),
            };
        }
        return StrategyVerdict {
            strategy,
            decision: Decision::Wait,
            confidence: 0.4,
            reason: "breakout volume but price at/below VWAP".to_string(),
        };
    }
    if input.price_change_pct > 2.0 {
        return StrategyVerdict {
            strategy,
            decision: Decision::Wait,
            confidence: 0.3,
            reason: "price breakout without confirming volume z-score".to_string(),
        };
    }
    StrategyVerdict { strategy, decision: Decision::NoTrade, confidence: 0.0, reason: "no price breakout".to_string() }
}

fn mean_reversion(input: &StrategyInput) -> StrategyVerdict {
    let strategy = Strategy::MeanReversion;
    let volume_declining = input.prev_volume_z.map(|prev| input.volume_z < prev).unwrap_or(false);

    if input.price_z > 4.0 && volume_declining {
        let confidence = interp(input.price_z, 4.0, 0.0, 7.0, 1.0);
        return StrategyVerdict {
            strategy,
            decision: Decision::NoTrade,
            confidence,
            reason: format!("extreme-overbought z_p={:.2}, no short capability", input.price_z),
        };
    }

    if input.price_z < -4.0 {
        let mut confidence = interp(input.price_z.abs(), 4.0, 0.0, 7.0, 1.0);
        let oversold_vs_vwap = input.vwap.map(|v| input.price < 0.95 * v).unwrap_or(false);
        if oversold_vs_vwap {
            confidence = (confidence * 1.2).min(1.0);
        }
        return StrategyVerdict {
            strategy,
            decision: Decision::Buy,
            confidence,
            reason: format!("extreme-oversold z_p={:.2}{}", input.price_z, if oversold_vs_vwap { ", below 0.95x VWAP" } else { "" }),
        };
    }

    if input.price_z > 4.0 {
        return StrategyVerdict {
            strategy,
            decision: Decision::Wait,
            confidence: 0.5,
            reason: "overbought but volume still rising".to_string(),
        };
    }

    StrategyVerdict { strategy, decision: Decision::NoTrade, confidence: 0.0, reason: "price within normal range".to_string() }
}

fn fakeout_filter(input: &StrategyInput) -> StrategyVerdict {
    let strategy = Strategy::FakeoutFilter;
    let is_breakout = input.price_change_pct > 3.0 || input.price_z > 2.0;

    if !is_breakout {
        return StrategyVerdict { strategy, decision: Decision::NoTrade, confidence: 0.0, reason: "no breakout condition".to_string() };
    }

    if input.volume_z < 1.0 {
        return StrategyVerdict {
            strategy,
            decision: Decision::NoTrade,
            confidence: 0.8,
            reason: "breakout with thin volume, likely fakeout".to_string(),
        };
    }

    if input.volume_z >= 2.0 {
        let confidence = interp(input.volume_z, 2.0, 0.0, 5.0, 1.0);
        return StrategyVerdict {
            strategy,
            decision: Decision::Buy,
            confidence,
            reason: format!("breakout confirmed by volume z={:.2}", input.volume_z),
        };
    }

    StrategyVerdict { strategy, decision: Decision::Wait, confidence: 0.4, reason: "breakout with marginal volume confirmation".to_string() }
}

/// Post-strategy pattern/regime adjustments from SPEC_FULL §4.6, applied
/// uniformly after the raw strategy verdicts are produced.
fn apply_adjustments(mut verdict: StrategyVerdict, input: &StrategyInput) -> StrategyVerdict {
    if input.range_breakout_same_direction_recent {
        verdict.confidence *= 1.3;
    }

    match (verdict.strategy, input.regime) {
        (Strategy::VolumeBreakout, Some(RegimeKind::Ranging)) if input.regime_confidence > 0.6 => {
            verdict.confidence *= 0.5;
        }
        (Strategy::MeanReversion, Some(RegimeKind::Ranging)) | (Strategy::MeanReversion, Some(RegimeKind::Volatile)) => {
            verdict.confidence *= 1.2;
        }
        _ => {}
    }

    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    verdict
}

/// Runs all three strategies against the same input, each independently
/// adjusted. Up to 3 signals are produced per incoming alert (DESIGN.md's
/// "up to 3 signals per alert" Open Question resolution).
pub fn evaluate_all(input: &StrategyInput) -> Vec<StrategyVerdict> {
    vec![volume_breakout(input), mean_reversion(input), fakeout_filter(input)]
        .into_iter()
        .map(|v| apply_adjustments(v, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> StrategyInput {
        StrategyInput {
            price_change_pct: 0.0,
            price_z: 0.0,
            volume_z: 0.0,
            prev_volume_z: None,
            price: 100.0,
            vwap: Some(100.0),
            regime: None,
            regime_confidence: 0.0,
            range_breakout_same_direction_recent: false,
        }
    }

    // S3 scenario: z_v=3.5, ΔP%=2.5, price>VWAP -> confidence ~= interp(3.5,3->0,6->1) = 0.1667
    #[test]
    fn volume_breakout_scenario_s3() {
        let input = StrategyInput { price_change_pct: 2.5, volume_z: 3.5, price: 110.0, vwap: Some(100.0), ..base_input() };
        let verdict = volume_breakout(&input);
        assert_eq!(verdict.decision, Decision::Buy);
        assert!((verdict.confidence - (0.5 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn volume_breakout_waits_below_vwap() {
        let input = StrategyInput { price_change_pct: 2.5, volume_z: 3.5, price: 95.0, vwap: Some(100.0), ..base_input() };
        let verdict = volume_breakout(&input);
        assert_eq!(verdict.decision, Decision::Wait);
        assert!((verdict.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn mean_reversion_oversold_buys_with_vwap_boost() {
        let input = StrategyInput { price_z: -5.0, price: 90.0, vwap: Some(100.0), ..base_input() };
        let verdict = mean_reversion(&input);
        assert_eq!(verdict.decision, Decision::Buy);
        let unboosted = interp(5.0, 4.0, 0.0, 7.0, 1.0);
        assert!((verdict.confidence - (unboosted * 1.2).min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn mean_reversion_overbought_is_no_trade_not_sell() {
        let input = StrategyInput { price_z: 5.0, volume_z: 1.0, prev_volume_z: Some(2.0), ..base_input() };
        let verdict = mean_reversion(&input);
        assert_eq!(verdict.decision, Decision::NoTrade);
        assert!(verdict.confidence > 0.0);
    }

    #[test]
    fn fakeout_filter_thin_volume_rejects_at_high_confidence() {
        let input = StrategyInput { price_change_pct: 4.0, volume_z: 0.5, ..base_input() };
        let verdict = fakeout_filter(&input);
        assert_eq!(verdict.decision, Decision::NoTrade);
        assert!((verdict.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn fakeout_filter_confirmed_breakout_buys() {
        let input = StrategyInput { price_change_pct: 4.0, volume_z: 3.5, ..base_input() };
        let verdict = fakeout_filter(&input);
        assert_eq!(verdict.decision, Decision::Buy);
    }

    #[test]
    fn ranging_regime_halves_volume_breakout_confidence_above_threshold() {
        let input = StrategyInput {
            price_change_pct: 2.5,
            volume_z: 3.5,
            price: 110.0,
            vwap: Some(100.0),
            regime: Some(RegimeKind::Ranging),
            regime_confidence: 0.7,
            ..base_input()
        };
        let raw = volume_breakout(&input);
        let adjusted = apply_adjustments(raw.clone(), &input);
        assert!((adjusted.confidence - (raw.confidence * 0.5).clamp(0.0, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn evaluate_all_returns_one_verdict_per_strategy() {
        let verdicts = evaluate_all(&base_input());
        assert_eq!(verdicts.len(), 3);
    }
}
