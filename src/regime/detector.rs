// =============================================================================
// Regime Classifier (C2)
// =============================================================================
//
// Runs on 5-minute candles per symbol: ATR(14, Wilder) and an EMA slope over
// a fixed window feed a small priority table (SPEC_FULL §4.3). `MarketRegime`
// is keyed by symbol (SPEC_FULL §3), so state and its change-tracking clock
// are sharded in per-symbol maps behind the teacher's `RwLock<HashMap<_>>`
// idiom rather than one global slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::atr::calculate_atr_pct;
use crate::indicators::ema::ema_slope_pct;
use crate::market_data::Candle;
use crate::types::RegimeKind;

/// Look-back window (in EMA bars) over which the slope is measured.
const EMA_PERIOD: usize = 21;
const SLOPE_WINDOW: usize = 5;
/// Bars required before a classification is trusted (SPEC_FULL §4.3).
const MIN_BARS: usize = 14;

/// ATR% above which the market is classified VOLATILE outright.
const VOLATILE_ATR_PCT: f64 = 2.0;
/// |EMA slope %| below which the market is classified RANGING.
const RANGING_SLOPE_PCT: f64 = 0.5;
/// ATR% that saturates classification confidence to 1.0.
const CONFIDENCE_SATURATION_ATR_PCT: f64 = 4.0;

/// Complete snapshot of the detected regime plus the metrics behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub kind: RegimeKind,
    pub confidence: f64,
    pub atr: f64,
    pub ema_slope_pct: f64,
    pub volatility_pct: f64,
    pub price_change_pct: f64,
    pub sample_insufficient: bool,
    pub regime_age_secs: f64,
}

/// Recommended reward:risk + max position sizing per regime — still
/// consulted by the strategy/filter layer, so kept alongside the new
/// classification rather than dropped.
impl RegimeKind {
    pub fn risk_params(self) -> ((f64, f64), f64) {
        match self {
            Self::TrendingUp | Self::TrendingDown => ((3.0, 1.0), 100.0),
            Self::Ranging => ((1.5, 1.0), 60.0),
            Self::Volatile => ((2.0, 1.0), 40.0),
        }
    }
}

pub struct RegimeDetector {
    state: RwLock<HashMap<String, RegimeState>>,
    last_change_time: RwLock<HashMap<String, Instant>>,
}

impl RegimeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs full classification for `symbol` on the provided 5-minute
    /// candles and closes.
    ///
    /// Returns `None` only when `closes` is empty (nothing to report at
    /// all); an under-sampled series still returns a state, flagged via
    /// `sample_insufficient` and defaulted to `Ranging` at zero confidence
    /// per SPEC_FULL §4.3.
    pub fn detect(&self, symbol: &str, candles: &[Candle], closes: &[f64]) -> Option<RegimeState> {
        if closes.is_empty() {
            return None;
        }

        let last_close = *closes.last()?;
        let first_close = *closes.first()?;
        let price_change_pct = if first_close.abs() > f64::EPSILON {
            (last_close - first_close) / first_close * 100.0
        } else {
            0.0
        };

        if candles.len() < MIN_BARS {
            let state = self.publish(symbol, RegimeKind::Ranging, 0.0, 0.0, 0.0, 0.0, price_change_pct, true);
            debug!(symbol, bars = candles.len(), "regime: insufficient sample, defaulting to RANGING");
            return Some(state);
        }

        let atr = calculate_atr_pct(candles, 14).unwrap_or(0.0);
        let slope = ema_slope_pct(closes, EMA_PERIOD, SLOPE_WINDOW).unwrap_or(0.0);

        let (kind, confidence) = classify(atr, slope);
        let state = self.publish(symbol, kind, confidence, atr, slope, atr, price_change_pct, false);

        debug!(
            symbol,
            regime = %kind,
            atr_pct = format!("{:.2}", atr),
            ema_slope_pct = format!("{:.2}", slope),
            confidence = format!("{:.2}", confidence),
            "regime detected"
        );

        Some(state)
    }

    /// Convenience wrapper extracting closes from the candle slice.
    pub fn update(&self, symbol: &str, candles: &[Candle]) -> Option<RegimeState> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.detect(symbol, candles, &closes)
    }

    pub fn current_regime(&self, symbol: &str) -> Option<RegimeState> {
        self.state.read().get(symbol).cloned()
    }

    #[allow(clippy::too_many_arguments)]
    fn publish(
        &self,
        symbol: &str,
        kind: RegimeKind,
        confidence: f64,
        atr: f64,
        ema_slope_pct: f64,
        volatility_pct: f64,
        price_change_pct: f64,
        sample_insufficient: bool,
    ) -> RegimeState {
        let now = Instant::now();
        let prev_kind = self.state.read().get(symbol).map(|s| s.kind);
        if prev_kind != Some(kind) {
            self.last_change_time.write().insert(symbol.to_string(), now);
        }
        let regime_age_secs = now
            .duration_since(*self.last_change_time.read().get(symbol).unwrap_or(&now))
            .as_secs_f64();

        let state = RegimeState {
            kind,
            confidence,
            atr,
            ema_slope_pct,
            volatility_pct,
            price_change_pct,
            sample_insufficient,
            regime_age_secs,
        };
        self.state.write().insert(symbol.to_string(), state.clone());
        state
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self { state: RwLock::new(HashMap::new()), last_change_time: RwLock::new(HashMap::new()) }
    }
}

/// Priority table from SPEC_FULL §4.3: VOLATILE outranks the slope bands.
/// Confidence is a function of ATR% alone, scaled to [0, 1].
fn classify(atr_pct: f64, ema_slope_pct: f64) -> (RegimeKind, f64) {
    let confidence = (atr_pct / CONFIDENCE_SATURATION_ATR_PCT).clamp(0.0, 1.0);

    if atr_pct > VOLATILE_ATR_PCT {
        return (RegimeKind::Volatile, confidence);
    }
    if ema_slope_pct.abs() < RANGING_SLOPE_PCT {
        return (RegimeKind::Ranging, confidence);
    }
    if ema_slope_pct >= RANGING_SLOPE_PCT {
        return (RegimeKind::TrendingUp, confidence);
    }
    (RegimeKind::TrendingDown, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_outranks_slope() {
        let (kind, _) = classify(3.0, 2.0);
        assert_eq!(kind, RegimeKind::Volatile);
    }

    #[test]
    fn flat_slope_is_ranging() {
        let (kind, _) = classify(1.0, 0.1);
        assert_eq!(kind, RegimeKind::Ranging);
    }

    #[test]
    fn rising_slope_is_trending_up() {
        let (kind, _) = classify(1.0, 0.8);
        assert_eq!(kind, RegimeKind::TrendingUp);
    }

    #[test]
    fn falling_slope_is_trending_down() {
        let (kind, _) = classify(1.0, -0.8);
        assert_eq!(kind, RegimeKind::TrendingDown);
    }

    #[test]
    fn boundary_slope_counts_as_trending() {
        // |slope| < 0.5 is RANGING; slope == 0.5 belongs to the >= branch.
        let (kind, _) = classify(1.0, 0.5);
        assert_eq!(kind, RegimeKind::TrendingUp);
    }

    #[test]
    fn confidence_scales_with_atr_and_saturates() {
        let (_, c1) = classify(1.0, 0.0);
        let (_, c2) = classify(2.0, 0.0);
        assert!(c2 > c1);
        let (_, saturated) = classify(10.0, 0.0);
        assert!((saturated - 1.0).abs() < 1e-9);
    }

    #[test]
    fn detector_defaults_to_ranging_with_insufficient_sample() {
        let detector = RegimeDetector::default();
        let candles: Vec<Candle> = Vec::new();
        let closes = vec![100.0, 101.0, 99.0];
        let state = detector.detect("ABCD", &candles, &closes).expect("some state even when under-sampled");
        assert_eq!(state.kind, RegimeKind::Ranging);
        assert!(state.sample_insufficient);
        assert_eq!(state.confidence, 0.0);
    }

    #[test]
    fn empty_closes_returns_none() {
        let detector = RegimeDetector::default();
        assert!(detector.detect("ABCD", &[], &[]).is_none());
    }

    #[test]
    fn state_is_sharded_per_symbol() {
        let detector = RegimeDetector::default();
        let candles: Vec<Candle> = Vec::new();
        detector.detect("ABCD", &candles, &[100.0, 101.0, 99.0]);
        assert!(detector.current_regime("ABCD").is_some());
        assert!(detector.current_regime("EFGH").is_none());
    }
}
