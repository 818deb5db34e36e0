// =============================================================================
// Persisted row types — one per §3 entity
// =============================================================================
//
// All rows are mapped at runtime via `sqlx::FromRow` rather than the
// `query_as!` compile-time macro family, since no live database connection is
// available while building this crate (see DESIGN.md, "Persistence").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{AlertType, Board, Decision, ExitReason, OutcomeStatus, RegimeKind, Side, Strategy, TradeClass};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TickRow {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub volume_shares: f64,
    pub volume_lots: f64,
    pub total_value: f64,
    pub board: String,
    pub trade_number: Option<i64>,
}

impl TickRow {
    pub fn side(&self) -> Side {
        match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            _ => Side::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandleRow {
    pub symbol: String,
    pub bucket: DateTime<Utc>,
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_shares: f64,
    pub volume_lots: f64,
    pub total_value: f64,
    pub trade_count: i64,
    pub dominant_board: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BaselineRow {
    pub symbol: String,
    pub calculated_at: DateTime<Utc>,
    pub lookback_hours: i32,
    pub sample_size: i64,
    pub price_mean: f64,
    pub price_stddev: f64,
    pub price_median: f64,
    pub price_p25: f64,
    pub price_p75: f64,
    pub volume_mean: f64,
    pub volume_stddev: f64,
    pub volume_median: f64,
    pub volume_p25: f64,
    pub volume_p75: f64,
    pub value_mean: f64,
    pub value_stddev: f64,
    pub value_median: f64,
    pub value_p25: f64,
    pub value_p75: f64,
}

impl BaselineRow {
    /// A baseline is "usable" iff sample_size >= 30 and std_dev > epsilon
    /// (SPEC_FULL §3). Checked against the volume stddev since that is the
    /// statistic the whale detector z-scores against.
    pub fn is_usable(&self) -> bool {
        self.sample_size >= 30 && self.volume_stddev > f64::EPSILON
    }

    /// VWAP approximation per the glossary: mean_value / mean_volume_shares.
    /// `volume_mean` is a mean of `volume_lots` (see `baseline.rs`), so it is
    /// converted back to shares here (1 lot = 100 shares, matching
    /// `store::ticks`'s share-to-lot conversion) before dividing.
    pub fn vwap(&self) -> Option<f64> {
        let shares_mean = self.volume_mean * 100.0;
        if shares_mean > f64::EPSILON {
            Some(self.value_mean / shares_mean)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegimeRow {
    pub symbol: String,
    pub detected_at: DateTime<Utc>,
    pub regime: String,
    pub confidence: f64,
    pub atr: f64,
    pub ema_slope_pct: f64,
    pub volatility_pct: f64,
    pub price_change_pct: f64,
    pub sample_insufficient: bool,
}

impl RegimeRow {
    pub fn kind(&self) -> RegimeKind {
        match self.regime.as_str() {
            "TRENDING_UP" => RegimeKind::TrendingUp,
            "TRENDING_DOWN" => RegimeKind::TrendingDown,
            "VOLATILE" => RegimeKind::Volatile,
            _ => RegimeKind::Ranging,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderFlowRow {
    pub symbol: String,
    pub bucket: DateTime<Utc>,
    pub buy_volume_lots: f64,
    pub sell_volume_lots: f64,
    pub buy_trade_count: i64,
    pub sell_trade_count: i64,
    pub buy_value: f64,
    pub sell_value: f64,
    pub volume_imbalance_ratio: f64,
    pub value_imbalance_ratio: f64,
    pub delta_volume: f64,
    pub aggressive_buy_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WhaleAlertRow {
    pub id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub symbol: String,
    pub alert_type: String,
    pub side: String,
    pub trigger_price: f64,
    pub trigger_volume_lots: f64,
    pub trigger_value: f64,
    pub pattern_trade_count: i32,
    pub z_score: f64,
    pub volume_vs_avg_pct: f64,
    pub avg_price: Option<f64>,
    pub confidence_score: f64,
    pub adaptive_threshold: f64,
    pub volatility_pct: f64,
    pub board: String,
}

impl WhaleAlertRow {
    pub fn alert_type(&self) -> AlertType {
        match self.alert_type.as_str() {
            "RAPID_ACCUMULATION" => AlertType::RapidAccumulation,
            _ => AlertType::SingleTrade,
        }
    }

    pub fn side(&self) -> Side {
        match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            _ => Side::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SignalRow {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub symbol: String,
    pub strategy: String,
    pub decision: String,
    pub confidence: f64,
    pub trigger_price: f64,
    pub trigger_volume_lots: f64,
    pub price_z: f64,
    pub volume_z: f64,
    pub price_change_pct: f64,
    pub reason: String,
    pub regime: Option<String>,
    pub whale_alert_id: Option<Uuid>,
    pub analysis_data: Option<serde_json::Value>,
    pub accepted: bool,
    pub trade_class: Option<String>,
}

impl SignalRow {
    pub fn strategy(&self) -> Strategy {
        match self.strategy.as_str() {
            "MEAN_REVERSION" => Strategy::MeanReversion,
            "FAKEOUT_FILTER" => Strategy::FakeoutFilter,
            _ => Strategy::VolumeBreakout,
        }
    }

    pub fn decision(&self) -> Decision {
        match self.decision.as_str() {
            "BUY" => Decision::Buy,
            "WAIT" => Decision::Wait,
            _ => Decision::NoTrade,
        }
    }

    pub fn trade_class(&self) -> Option<TradeClass> {
        match self.trade_class.as_deref() {
            Some("SWING") => Some(TradeClass::Swing),
            Some("DAY") => Some(TradeClass::Day),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutcomeRow {
    pub signal_id: Uuid,
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_decision: String,
    pub atr_at_entry: f64,
    pub trailing_stop_price: f64,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<String>,
    pub holding_minutes: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub profit_loss_pct: Option<f64>,
    pub mfe: f64,
    pub mae: f64,
    pub risk_reward_ratio: Option<f64>,
    pub status: String,
    pub trade_class: String,
    pub rejection_reason: Option<String>,
}

impl OutcomeRow {
    pub fn status(&self) -> OutcomeStatus {
        match self.status.as_str() {
            "OPEN" => OutcomeStatus::Open,
            "WIN" => OutcomeStatus::Win,
            "LOSS" => OutcomeStatus::Loss,
            "BREAKEVEN" => OutcomeStatus::Breakeven,
            "SKIPPED" => OutcomeStatus::Skipped,
            _ => OutcomeStatus::Pending,
        }
    }

    pub fn trade_class(&self) -> TradeClass {
        match self.trade_class.as_str() {
            "SWING" => TradeClass::Swing,
            _ => TradeClass::Day,
        }
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self.exit_reason.as_deref() {
            Some("STOP_LOSS") => Some(ExitReason::StopLoss),
            Some("TRAILING_STOP") => Some(ExitReason::TrailingStop),
            Some("TAKE_PROFIT_1") => Some(ExitReason::TakeProfit1),
            Some("TAKE_PROFIT_2") => Some(ExitReason::TakeProfit2),
            Some("MAX_HOLDING_TIME") => Some(ExitReason::MaxHoldingTime),
            Some("MARKET_CLOSE") => Some(ExitReason::MarketClose),
            _ => None,
        }
    }
}

pub fn board_to_str(b: Board) -> &'static str {
    match b {
        Board::Rg => "RG",
        Board::Tn => "TN",
        Board::Ng => "NG",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_baseline(sample_size: i64, volume_stddev: f64) -> BaselineRow {
        BaselineRow {
            symbol: "ABCD".into(),
            calculated_at: Utc::now(),
            lookback_hours: 1,
            sample_size,
            price_mean: 1000.0,
            price_stddev: 10.0,
            price_median: 1000.0,
            price_p25: 990.0,
            price_p75: 1010.0,
            volume_mean: 500.0,
            volume_stddev,
            volume_median: 500.0,
            volume_p25: 400.0,
            volume_p75: 600.0,
            // value = price * shares = price_mean * (volume_mean lots * 100 shares/lot)
            value_mean: 50_000_000.0,
            value_stddev: 100_000.0,
            value_median: 50_000_000.0,
            value_p25: 40_000_000.0,
            value_p75: 60_000_000.0,
        }
    }

    #[test]
    fn baseline_usable_requires_sample_and_variance() {
        assert!(sample_baseline(30, 100.0).is_usable());
        assert!(!sample_baseline(29, 100.0).is_usable());
        assert!(!sample_baseline(30, 0.0).is_usable());
    }

    #[test]
    fn vwap_is_value_over_volume() {
        let b = sample_baseline(30, 100.0);
        assert!((b.vwap().unwrap() - 1000.0).abs() < 1e-9);
    }
}
