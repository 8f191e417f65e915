//! Lifecycle event bus.
//!
//! Fire-and-forget: publishing never fails trading logic, even with no
//! subscribers attached.

use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::debug;

/// Kinds of lifecycle events published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The scanner surfaced a tradable opportunity.
    OpportunityFound,
    /// Both legs of a pair filled.
    PositionOpened,
    /// A pair (or single leg) was closed.
    PositionClosed,
    /// Risk policy demands closing everything.
    CloseAllPositions,
    /// A record was written to the trade log.
    TradeLogged,
}

/// A published event with its JSON payload.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// Structured payload.
    pub payload: serde_json::Value,
    /// Publish time.
    pub at: OffsetDateTime,
}

/// Broadcast-backed notification bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Send failures (no subscribers) are ignored.
    pub fn publish(&self, kind: EventKind, payload: serde_json::Value) {
        let event = Event {
            kind,
            payload,
            at: OffsetDateTime::now_utc(),
        };
        debug!(kind = %event.kind, "event published");
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(EventKind::OpportunityFound, json!({"symbol": "ETH"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::OpportunityFound);
        assert_eq!(event.payload["symbol"], "ETH");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(EventKind::PositionClosed, json!({}));
    }
}
