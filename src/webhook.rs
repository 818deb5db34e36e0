// =============================================================================
// Webhook notifier
// =============================================================================
//
// POSTs a JSON payload to a configured subscriber URL whenever a whale alert
// or a closed position passes that subscriber's filters. Grounded on
// `binance/client.rs`'s pooled `reqwest::Client` construction (shared
// timeout, built once at startup); delivery itself keeps the source's fixed
// retry-count-with-constant-delay contract rather than introducing
// exponential backoff (DESIGN.md, webhook 429/backoff).

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{self, Store};
use crate::types::{AlertType, Side};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-subscriber predicate: which events actually get POSTed.
#[derive(Debug, Clone)]
pub struct WebhookFilter {
    pub alert_types: Option<Vec<AlertType>>,
    pub symbols: Option<Vec<String>>,
    pub min_confidence: f64,
    pub min_value: f64,
}

impl Default for WebhookFilter {
    fn default() -> Self {
        Self { alert_types: None, symbols: None, min_confidence: 0.0, min_value: 0.0 }
    }
}

impl WebhookFilter {
    fn accepts(&self, event: &WebhookEvent) -> bool {
        if let Some(types) = &self.alert_types {
            if let Some(kind) = event.alert_type {
                if !types.contains(&kind) {
                    return false;
                }
            }
        }
        if let Some(symbols) = &self.symbols {
            if !symbols.iter().any(|s| s == &event.symbol) {
                return false;
            }
        }
        event.confidence >= self.min_confidence && event.value >= self.min_value
    }
}

/// The event shape handed to the notifier; `alert_type` is `None` for
/// position-outcome events, which the filter's type set does not gate.
pub struct WebhookEvent {
    pub name: &'static str,
    pub symbol: String,
    pub alert_type: Option<AlertType>,
    pub side: Option<Side>,
    pub confidence: f64,
    pub value: f64,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    symbol: &'a str,
    data: &'a serde_json::Value,
}

/// Posts filtered events to a single configured URL with a bounded retry
/// count. One `WebhookNotifier` per subscriber URL; the crate currently
/// wires exactly one from `WEBHOOK_URL`.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    filter: WebhookFilter,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, filter: WebhookFilter) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self { client, url: url.into(), filter }
    }

    /// Delivers `event` if it passes this subscriber's filter. Retries up to
    /// `MAX_ATTEMPTS` times with a constant `RETRY_DELAY` between attempts;
    /// the outcome (success or final failure) is always persisted.
    pub async fn notify(&self, store: &Store, event: WebhookEvent) {
        if !self.filter.accepts(&event) {
            return;
        }

        let envelope = Envelope { event: event.name, symbol: &event.symbol, data: &event.payload };

        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;
        let mut attempts = 0u32;

        for attempt in 1..=MAX_ATTEMPTS {
            attempts = attempt;
            match self.client.post(&self.url).json(&envelope).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    last_status = Some(status.as_u16());
                    if status.is_success() {
                        debug!(url = %self.url, event = event.name, attempt, "webhook delivered");
                        last_error = None;
                        break;
                    }
                    last_error = Some(format!("http status {status}"));
                    warn!(url = %self.url, event = event.name, attempt, %status, "webhook delivery rejected");
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    warn!(url = %self.url, event = event.name, attempt, error = %e, "webhook delivery failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        let success = last_error.is_none();
        if let Err(e) = store::webhook::log_delivery(
            store.pool(),
            &self.url,
            event.name,
            Some(&event.symbol),
            attempts,
            success,
            last_status,
            last_error.as_deref(),
        )
        .await
        {
            warn!(error = %e, "failed to persist webhook delivery log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(alert_type: Option<AlertType>, symbol: &str, confidence: f64, value: f64) -> WebhookEvent {
        WebhookEvent {
            name: "whale_alert",
            symbol: symbol.to_string(),
            alert_type,
            side: None,
            confidence,
            value,
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn filter_rejects_below_min_confidence() {
        let filter = WebhookFilter { min_confidence: 0.8, ..Default::default() };
        assert!(!filter.accepts(&event(None, "BBCA", 0.5, 1_000_000_000.0)));
        assert!(filter.accepts(&event(None, "BBCA", 0.9, 1_000_000_000.0)));
    }

    #[test]
    fn filter_restricts_to_symbol_set() {
        let filter = WebhookFilter { symbols: Some(vec!["BBCA".to_string()]), ..Default::default() };
        assert!(filter.accepts(&event(None, "BBCA", 1.0, 0.0)));
        assert!(!filter.accepts(&event(None, "TLKM", 1.0, 0.0)));
    }

    #[test]
    fn filter_restricts_to_alert_type_set() {
        let filter = WebhookFilter { alert_types: Some(vec![AlertType::RapidAccumulation]), ..Default::default() };
        assert!(filter.accepts(&event(Some(AlertType::RapidAccumulation), "BBCA", 1.0, 0.0)));
        assert!(!filter.accepts(&event(Some(AlertType::SingleTrade), "BBCA", 1.0, 0.0)));
        // position-outcome events carry no alert_type and are not gated by it
        assert!(filter.accepts(&event(None, "BBCA", 1.0, 0.0)));
    }

    #[test]
    fn default_filter_accepts_everything() {
        let filter = WebhookFilter::default();
        assert!(filter.accepts(&event(Some(AlertType::SingleTrade), "ANY", 0.0, 0.0)));
    }
}
