// =============================================================================
// Position barrier math (C8)
// =============================================================================
//
// Pure ATR-multiple stop/take-profit/trailing-stop levels plus the fee-aware
// WIN/LOSS/BREAKEVEN classifier. Grounded on `exit/triple_barrier.rs`'s
// `BarrierConfig`/`BarrierState` shape: same "derive levels from ATR, only
// ever tighten the stop" discipline, restated against the exact k-multiples
// and exit-priority order of SPEC_FULL §4.8 rather than the teacher's
// regime-keyed multiplier table.

use crate::config::{AtrMultipliers, BreakevenConfig};
use crate::types::{ExitReason, TradeClass};

const FEE_THRESHOLD_PCT: f64 = 0.25;
const DAY_TIME_DECAY_START_MIN: f64 = 120.0;
const DAY_TIME_DECAY_END_MIN: f64 = 240.0;
const DAY_TIME_DECAY_FLOOR: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct BarrierLevels {
    pub hard_stop: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub trailing_stop: f64,
}

impl BarrierLevels {
    pub fn new(entry_price: f64, atr: f64, multipliers: &AtrMultipliers) -> Self {
        Self {
            hard_stop: entry_price - multipliers.k_sl * atr,
            tp1: entry_price + multipliers.k_tp1 * atr,
            tp2: entry_price + multipliers.k_tp2 * atr,
            trailing_stop: entry_price - multipliers.k_ts * atr,
        }
    }

    /// Raises the trailing stop on a new high; never lowers it
    /// (SPEC_FULL property 7).
    pub fn update_trailing_stop(&mut self, current_price: f64, atr: f64, k_ts: f64) {
        let candidate = current_price - k_ts * atr;
        if candidate > self.trailing_stop {
            self.trailing_stop = candidate;
        }
    }

    /// Breakeven promotion: once unrealized P/L reaches `trigger_pct`, raise
    /// the trailing stop to entry * (1 + buffer_pct). Only ever raises.
    pub fn promote_to_breakeven(&mut self, entry_price: f64, unrealized_pl_pct: f64, cfg: &BreakevenConfig) {
        if unrealized_pl_pct < cfg.trigger_pct {
            return;
        }
        let breakeven = entry_price * (1.0 + cfg.buffer_pct / 100.0);
        if breakeven > self.trailing_stop {
            self.trailing_stop = breakeven;
        }
    }

    /// Effective TP1, time-decayed toward `DAY_TIME_DECAY_FLOOR` between 120
    /// and 240 holding minutes (DAY trades only).
    pub fn effective_tp1(&self, entry_price: f64, trade_class: TradeClass, holding_minutes: f64) -> f64 {
        if trade_class != TradeClass::Day || holding_minutes <= DAY_TIME_DECAY_START_MIN {
            return self.tp1;
        }
        let span = self.tp1 - entry_price;
        if holding_minutes >= DAY_TIME_DECAY_END_MIN {
            return entry_price + DAY_TIME_DECAY_FLOOR * span;
        }
        let progress = (holding_minutes - DAY_TIME_DECAY_START_MIN) / (DAY_TIME_DECAY_END_MIN - DAY_TIME_DECAY_START_MIN);
        let decay = 1.0 - progress * (1.0 - DAY_TIME_DECAY_FLOOR);
        entry_price + decay * span
    }
}

/// Evaluates the exit priority for one polling tick. `max_holding_minutes`
/// is 240 for DAY, `max_holding_days * 1440` for SWING. `is_market_close`
/// forces a DAY close regardless of holding time; SWING ignores it.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_exit(
    levels: &BarrierLevels,
    entry_price: f64,
    current_price: f64,
    trade_class: TradeClass,
    holding_minutes: f64,
    max_holding_minutes: f64,
    is_market_close: bool,
) -> Option<ExitReason> {
    if current_price <= levels.hard_stop {
        return Some(ExitReason::StopLoss);
    }
    if current_price <= levels.trailing_stop {
        return Some(ExitReason::TrailingStop);
    }
    if current_price >= levels.tp2 {
        return Some(ExitReason::TakeProfit2);
    }
    let effective_tp1 = levels.effective_tp1(entry_price, trade_class, holding_minutes);
    if current_price >= effective_tp1 {
        return Some(ExitReason::TakeProfit1);
    }
    if trade_class == TradeClass::Day && holding_minutes >= max_holding_minutes {
        return Some(ExitReason::MaxHoldingTime);
    }
    if trade_class == TradeClass::Swing && holding_minutes >= max_holding_minutes {
        return Some(ExitReason::MaxHoldingTime);
    }
    if trade_class == TradeClass::Day && is_market_close {
        return Some(ExitReason::MarketClose);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Win,
    Loss,
    Breakeven,
}

/// Fee-aware WIN/LOSS/BREAKEVEN classification (SPEC_FULL §4.8).
pub fn classify(pnl_pct: f64) -> Classification {
    if pnl_pct > FEE_THRESHOLD_PCT {
        Classification::Win
    } else if pnl_pct < -FEE_THRESHOLD_PCT {
        Classification::Loss
    } else {
        Classification::Breakeven
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipliers() -> AtrMultipliers {
        AtrMultipliers { k_sl: 1.5, k_tp1: 3.0, k_tp2: 6.0, k_ts: 2.0 }
    }

    #[test]
    fn levels_derive_from_atr() {
        let levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        assert!((levels.hard_stop - 97.0).abs() < 1e-9);
        assert!((levels.tp1 - 106.0).abs() < 1e-9);
        assert!((levels.tp2 - 112.0).abs() < 1e-9);
        assert!((levels.trailing_stop - 96.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_never_lowered() {
        let mut levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        levels.update_trailing_stop(110.0, 2.0, 2.0);
        assert!((levels.trailing_stop - 106.0).abs() < 1e-9);
        levels.update_trailing_stop(90.0, 2.0, 2.0);
        assert!((levels.trailing_stop - 106.0).abs() < 1e-9, "stop must not lower on a pullback");
    }

    #[test]
    fn breakeven_promotion_only_raises() {
        let mut levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        let cfg = BreakevenConfig { trigger_pct: 1.0, buffer_pct: 0.15 };
        levels.promote_to_breakeven(100.0, 1.5, &cfg);
        assert!((levels.trailing_stop - 100.15).abs() < 1e-9);
        levels.promote_to_breakeven(100.0, 0.2, &cfg);
        assert!((levels.trailing_stop - 100.15).abs() < 1e-9, "must not drop below breakeven once promoted");
    }

    #[test]
    fn effective_tp1_decays_for_day_trades_only() {
        let levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        assert!((levels.effective_tp1(100.0, TradeClass::Day, 60.0) - 106.0).abs() < 1e-9);
        let at_240 = levels.effective_tp1(100.0, TradeClass::Day, 240.0);
        assert!((at_240 - 103.6).abs() < 1e-9);
        let swing_unaffected = levels.effective_tp1(100.0, TradeClass::Swing, 300.0);
        assert!((swing_unaffected - 106.0).abs() < 1e-9);
    }

    #[test]
    fn exit_priority_stop_before_trailing_before_tp() {
        let levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        let reason = evaluate_exit(&levels, 100.0, 96.0, TradeClass::Day, 30.0, 240.0, false);
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn market_close_forces_day_exit_but_not_swing() {
        let levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        let day = evaluate_exit(&levels, 100.0, 101.0, TradeClass::Day, 30.0, 240.0, true);
        assert_eq!(day, Some(ExitReason::MarketClose));
        let swing = evaluate_exit(&levels, 100.0, 101.0, TradeClass::Swing, 30.0, 14400.0, true);
        assert_eq!(swing, None);
    }

    #[test]
    fn max_holding_time_triggers_when_no_other_barrier_hit() {
        let levels = BarrierLevels::new(100.0, 2.0, &multipliers());
        let reason = evaluate_exit(&levels, 100.0, 100.5, TradeClass::Day, 241.0, 240.0, false);
        assert_eq!(reason, Some(ExitReason::MaxHoldingTime));
    }

    #[test]
    fn classification_uses_fee_threshold() {
        assert_eq!(classify(0.3), Classification::Win);
        assert_eq!(classify(-0.3), Classification::Loss);
        assert_eq!(classify(0.1), Classification::Breakeven);
        assert_eq!(classify(-0.25), Classification::Breakeven);
    }
}
