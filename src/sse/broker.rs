// =============================================================================
// SSE Broker (C9)
// =============================================================================
//
// A single event loop owns the subscriber map; producers publish through a
// cloneable handle, subscribers register/unregister through a tiny control
// channel, and fan-out uses a non-blocking send per subscriber so one slow
// reader never backpressures the rest of the system (SPEC_FULL §4.9).
// Grounded on `api/ws.rs`'s connection-lifecycle shape (register on
// connect, clean up on drop), adapted from one-socket-per-client push to a
// shared broadcast loop since SSE is server -> client only.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 10;
const BROADCAST_BUFFER: usize = 1024;
const CONTROL_BUFFER: usize = 1;

#[derive(Debug, Clone)]
pub struct Event {
    pub name: &'static str,
    pub data: Value,
}

enum Control {
    Register { id: Uuid, tx: mpsc::Sender<Event> },
    Unregister(Uuid),
}

/// Cloneable publish/subscribe handle. Cheap to clone and share across
/// `AppState`.
#[derive(Clone)]
pub struct SseBroker {
    control_tx: mpsc::Sender<Control>,
    broadcast_tx: broadcast::Sender<Event>,
}

/// A single subscriber's event stream plus the handle needed to unregister
/// on drop.
pub struct Subscription {
    rx: mpsc::Receiver<Event>,
    id: Uuid,
    control_tx: mpsc::Sender<Control>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.control_tx.try_send(Control::Unregister(self.id));
    }
}

impl SseBroker {
    pub fn new() -> (Self, BrokerTask) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(BROADCAST_BUFFER);
        (Self { control_tx, broadcast_tx }, BrokerTask { control_rx, broadcast_rx })
    }

    /// Publishes an event to every current subscriber. Never blocks: if the
    /// broadcast channel is full, the oldest buffered event is dropped for
    /// slow subscribers (standard `tokio::sync::broadcast` lagged-receiver
    /// behavior), not the publisher.
    pub fn publish(&self, name: &'static str, data: Value) {
        let _ = self.broadcast_tx.send(Event { name, data });
    }

    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        let _ = self.control_tx.send(Control::Register { id, tx }).await;
        Subscription { rx, id, control_tx: self.control_tx.clone() }
    }
}

/// Owns the subscriber map and runs the fan-out loop. Spawn once at startup
/// via `run`.
pub struct BrokerTask {
    control_rx: mpsc::Receiver<Control>,
    broadcast_rx: broadcast::Receiver<Event>,
}

impl BrokerTask {
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut subscribers: HashMap<Uuid, mpsc::Sender<Event>> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("sse broker cancelled");
                    return;
                }
                ctrl = self.control_rx.recv() => {
                    match ctrl {
                        Some(Control::Register { id, tx }) => {
                            subscribers.insert(id, tx);
                        }
                        Some(Control::Unregister(id)) => {
                            subscribers.remove(&id);
                        }
                        None => return,
                    }
                }
                evt = self.broadcast_rx.recv() => {
                    match evt {
                        Ok(event) => {
                            subscribers.retain(|_, tx| match tx.try_send(event.clone()) {
                                Ok(()) => true,
                                Err(mpsc::error::TrySendError::Full(_)) => true,
                                Err(mpsc::error::TrySendError::Closed(_)) => false,
                            });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "sse broker lagged, some events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let (broker, task) = SseBroker::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));

        let mut sub = broker.subscribe().await;
        tokio::task::yield_now().await;
        broker.publish("whale_alert", serde_json::json!({"symbol": "ABC"}));

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), sub.recv()).await.unwrap();
        assert!(event.is_some());
        assert_eq!(event.unwrap().name, "whale_alert");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn unregister_on_drop_removes_subscriber() {
        let (broker, task) = SseBroker::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.run(cancel.clone()));

        let sub = broker.subscribe().await;
        tokio::task::yield_now().await;
        drop(sub);
        tokio::task::yield_now().await;

        // publishing after the only subscriber dropped should not panic or hang
        broker.publish("whale_alert", serde_json::json!({}));
        tokio::task::yield_now().await;

        cancel.cancel();
        let _ = handle.await;
    }
}
