// =============================================================================
// Exchange feed — authenticated frame source (C3's upstream collaborator)
// =============================================================================
//
// Out of the core's scope proper (spec §1 names the wire decoder and auth
// client as external collaborators), but still needed to drive the pipeline
// end to end; grounded on the teacher's kline WebSocket reader
// (market_data/candle_buffer.rs's `run_kline_stream`) and reworked around a
// generic authenticated trade frame instead of a Binance kline.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::types::{Board, Side};

/// One executed-trade frame off the wire, already shape-normalized but not
/// yet validated or persisted.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub volume_shares: f64,
    pub board: Board,
    pub trade_number: Option<i64>,
    pub ts: DateTime<Utc>,
}

/// Refreshes and hands out the bearer token used to authenticate the feed
/// connection. Proactively refreshed within 10 minutes of expiry; on a 401
/// the feed re-authenticates and retries once (SPEC_FULL §6).
pub trait FeedAuth: Send + Sync {
    fn token(&self) -> impl std::future::Future<Output = Result<String>> + Send;
    fn refresh(&self) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Abstraction over the wire frame source so the ingest loop is testable
/// without a live socket. Kept generic (no `dyn`) since the only
/// implementation the process wires up is `WsFeedSource`.
pub trait FeedSource: Send {
    fn next_frame(&mut self) -> impl std::future::Future<Output = Result<Option<RawFrame>>> + Send;
}

/// WebSocket-backed feed, reconnecting the caller's responsibility (main.rs
/// loops on `run` the way the teacher loops on `run_kline_stream`).
pub struct WsFeedSource {
    url: String,
    read: Option<futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >>,
}

impl WsFeedSource {
    pub fn new(url: String) -> Self {
        Self { url, read: None }
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.read.is_some() {
            return Ok(());
        }
        info!(url = %self.url, "connecting to feed WebSocket");
        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .context("failed to connect to feed WebSocket")?;
        let (_write, read) = ws_stream.split();
        self.read = Some(read);
        info!("feed WebSocket connected");
        Ok(())
    }
}

impl FeedSource for WsFeedSource {
    async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        self.ensure_connected().await?;
        let read = self.read.as_mut().expect("connected above");
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match parse_trade_frame(&text) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        warn!(error = %e, "failed to parse feed frame, skipping");
                        continue;
                    }
                },
                Some(Ok(_)) => continue, // ping/pong/binary/close -- ignored
                Some(Err(e)) => {
                    error!(error = %e, "feed WebSocket read error");
                    self.read = None;
                    return Err(e.into());
                }
                None => {
                    warn!("feed WebSocket stream ended");
                    self.read = None;
                    return Ok(None);
                }
            }
        }
    }
}

fn parse_trade_frame(text: &str) -> Result<RawFrame> {
    let root: serde_json::Value = serde_json::from_str(text).context("invalid frame JSON")?;

    let symbol = root["symbol"].as_str().context("missing symbol")?.to_uppercase();
    let side = match root["side"].as_str().unwrap_or("") {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        _ => Side::Unknown,
    };
    let price = root["price"].as_f64().context("missing price")?;
    let volume_shares = root["volume"].as_f64().context("missing volume")?;
    let board = match root["board"].as_str().unwrap_or("RG") {
        "TN" => Board::Tn,
        "NG" => Board::Ng,
        _ => Board::Rg,
    };
    let trade_number = root["trade_number"].as_i64();
    let ts = root["ts"]
        .as_i64()
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
        .unwrap_or_else(Utc::now);

    debug!(symbol = %symbol, price, volume_shares, "parsed feed frame");

    Ok(RawFrame { symbol, side, price, volume_shares, board, trade_number, ts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_frame() {
        let json = r#"{"symbol":"abcd","side":"BUY","price":1020.0,"volume":160000.0,"board":"RG","trade_number":42,"ts":1700000000000}"#;
        let frame = parse_trade_frame(json).unwrap();
        assert_eq!(frame.symbol, "ABCD");
        assert_eq!(frame.side, Side::Buy);
        assert_eq!(frame.trade_number, Some(42));
    }

    #[test]
    fn missing_required_field_errors() {
        let json = r#"{"side":"BUY","price":1020.0,"volume":160000.0}"#;
        assert!(parse_trade_frame(json).is_err());
    }
}
