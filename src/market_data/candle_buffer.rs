use serde::{Deserialize, Serialize};

/// A single OHLCV candle, shared by the regime classifier (§4.3) and the
/// outcome tracker's ATR calculation — both convert a persisted `CandleRow`
/// into this shape before feeding it to `indicators::atr`/`RegimeDetector`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub is_closed: bool,
}
