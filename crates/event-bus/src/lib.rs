//! Observer bus for resilience engine events.
//!
//! Components publish [`EngineEvent`]s; dashboards, loggers or tests subscribe. Publishing never
//! fails and never blocks: an event with no subscribers is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    fn publish(&self, event: E);
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Discrete engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    ErrorHandled {
        error_id: String,
        kind: String,
        confidence: f64,
        recovered: bool,
        strategy: Option<String>,
        action: String,
        at: DateTime<Utc>,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        recovered: bool,
        error: String,
        at: DateTime<Utc>,
    },
    ElementFound {
        selector: String,
        strategy: String,
        matched_selector: Option<String>,
        duration_ms: u64,
        attempts: usize,
        at: DateTime<Utc>,
    },
    ElementNotFound {
        selector: String,
        attempts: usize,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    StrategyStatsUpdated {
        key: String,
        strategy: String,
        attempts: u64,
        success_rate: f64,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ErrorHandled { .. } => "error-handled",
            EngineEvent::RetryAttempt { .. } => "retry-attempt",
            EngineEvent::ElementFound { .. } => "element-found",
            EngineEvent::ElementNotFound { .. } => "element-not-found",
            EngineEvent::StrategyStatsUpdated { .. } => "strategy-stats-updated",
        }
    }
}

/// Shared handle used by every engine component
pub type SharedBus = Arc<dyn EventBus<EngineEvent>>;

/// Simple in-memory bus backed by a broadcast channel.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) {
        if let Err(err) = self.sender.send(event) {
            trace!("event dropped, no subscribers: {:?}", err.0);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Bus that discards everything
pub struct NullBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> NullBus<E>
where
    E: Event,
{
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(1);
        Arc::new(Self { sender })
    }
}

impl<E> EventBus<E> for NullBus<E>
where
    E: Event,
{
    fn publish(&self, _event: E) {}

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription
/// so callers can await events without handling broadcast semantics directly.
pub fn to_mpsc<E>(bus: Arc<dyn EventBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!("subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineEvent {
        EngineEvent::ElementNotFound {
            selector: "#gone".into(),
            attempts: 7,
            duration_ms: 12,
            at: Utc::now(),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = InMemoryBus::<EngineEvent>::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(sample());
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = InMemoryBus::<EngineEvent>::new(4);
        let mut rx = bus.subscribe();
        bus.publish(sample());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "element-not-found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mpsc_bridge_forwards() {
        let bus: Arc<dyn EventBus<EngineEvent>> = InMemoryBus::new(4);
        let mut rx = to_mpsc(bus.clone(), 4);
        tokio::task::yield_now().await;
        bus.publish(sample());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::ElementNotFound { attempts: 7, .. }));
    }

    #[test]
    fn events_serialize_with_kebab_tag() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "element-not-found");
    }
}
