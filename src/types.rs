// =============================================================================
// Shared domain types used across the tick-engine pipeline (C1-C9)
// =============================================================================

use serde::{Deserialize, Serialize};

/// Side of a trade or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    Unknown,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Market segment a trade was executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Board {
    /// Regular market.
    Rg,
    /// Cash market.
    Tn,
    /// Negotiated market.
    Ng,
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rg => write!(f, "RG"),
            Self::Tn => write!(f, "TN"),
            Self::Ng => write!(f, "NG"),
        }
    }
}

/// The four online market regimes. Per DESIGN.md's Open Question resolution,
/// the "insufficient data" case is represented as `Ranging` with
/// `confidence = 0.0`, not a fifth variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeKind {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
}

impl std::fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendingUp => write!(f, "TRENDING_UP"),
            Self::TrendingDown => write!(f, "TRENDING_DOWN"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Volatile => write!(f, "VOLATILE"),
        }
    }
}

/// Whale-alert detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    SingleTrade,
    RapidAccumulation,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleTrade => write!(f, "SINGLE_TRADE"),
            Self::RapidAccumulation => write!(f, "RAPID_ACCUMULATION"),
        }
    }
}

/// The three signal-generating strategies (C6), modeled as a tagged variant
/// sharing one `evaluate` operation rather than a class hierarchy (SPEC_FULL §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    VolumeBreakout,
    MeanReversion,
    FakeoutFilter,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VolumeBreakout => write!(f, "VOLUME_BREAKOUT"),
            Self::MeanReversion => write!(f, "MEAN_REVERSION"),
            Self::FakeoutFilter => write!(f, "FAKEOUT_FILTER"),
        }
    }
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::VolumeBreakout,
        Strategy::MeanReversion,
        Strategy::FakeoutFilter,
    ];
}

/// Decision produced by a strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Wait,
    NoTrade,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Wait => write!(f, "WAIT"),
            Self::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}

/// Position lifecycle status (C8). Transitions are monotonic:
/// PENDING -> {SKIPPED, OPEN} -> {WIN, LOSS, BREAKEVEN}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Pending,
    Open,
    Win,
    Loss,
    Breakeven,
    Skipped,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::Win => write!(f, "WIN"),
            Self::Loss => write!(f, "LOSS"),
            Self::Breakeven => write!(f, "BREAKEVEN"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl OutcomeStatus {
    /// Whether `self -> next` is an allowed monotonic transition.
    pub fn can_transition_to(self, next: OutcomeStatus) -> bool {
        use OutcomeStatus::*;
        matches!(
            (self, next),
            (Pending, Skipped) | (Pending, Open) | (Open, Win) | (Open, Loss) | (Open, Breakeven)
        )
    }
}

/// DAY vs SWING trade classification (mutually exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeClass {
    Day,
    Swing,
}

impl std::fmt::Display for TradeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Swing => write!(f, "SWING"),
        }
    }
}

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit1,
    TakeProfit2,
    MaxHoldingTime,
    MarketClose,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::TakeProfit1 => write!(f, "TAKE_PROFIT_1"),
            Self::TakeProfit2 => write!(f, "TAKE_PROFIT_2"),
            Self::MaxHoldingTime => write!(f, "MAX_HOLDING_TIME"),
            Self::MarketClose => write!(f, "MARKET_CLOSE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_status_monotonic_transitions() {
        assert!(OutcomeStatus::Pending.can_transition_to(OutcomeStatus::Open));
        assert!(OutcomeStatus::Pending.can_transition_to(OutcomeStatus::Skipped));
        assert!(OutcomeStatus::Open.can_transition_to(OutcomeStatus::Win));
        assert!(!OutcomeStatus::Open.can_transition_to(OutcomeStatus::Pending));
        assert!(!OutcomeStatus::Skipped.can_transition_to(OutcomeStatus::Open));
        assert!(!OutcomeStatus::Win.can_transition_to(OutcomeStatus::Loss));
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(RegimeKind::TrendingUp.to_string(), "TRENDING_UP");
        assert_eq!(Strategy::FakeoutFilter.to_string(), "FAKEOUT_FILTER");
        assert_eq!(ExitReason::StopLoss.to_string(), "STOP_LOSS");
    }
}
