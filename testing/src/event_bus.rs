//! In-memory event bus for fast, deterministic tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock poisoning

use patientcare_core::event::SerializedEvent;
use patientcare_core::event_bus::{EventBus, EventBusError, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Per-topic subscriber channel.
type Subscribers = Vec<mpsc::UnboundedSender<Result<SerializedEvent, EventBusError>>>;

/// In-memory [`EventBus`] with published-event inspection.
///
/// Publishing records the envelope and forwards it to every live
/// subscriber of the topic. Subscriptions created after a publish do not
/// see earlier events (latest-offset semantics, matching the production
/// bus default). Tests can assert on [`published`](Self::published) or
/// force redelivery with [`redeliver`](Self::redeliver) to exercise
/// idempotence.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    published: HashMap<String, Vec<SerializedEvent>>,
    subscribers: HashMap<String, Subscribers>,
    publish_errors: HashMap<String, EventBusError>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All envelopes published to a topic, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn published(&self, topic: &str) -> Vec<SerializedEvent> {
        self.inner
            .lock()
            .unwrap()
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Total envelopes published across all topics.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn published_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .published
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Re-deliver an envelope to current subscribers without recording
    /// it again. Simulates at-least-once redelivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn redeliver(&self, topic: &str, event: &SerializedEvent) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.get_mut(topic) {
            senders.retain(|tx| tx.send(Ok(event.clone())).is_ok());
        }
    }

    /// Deliver a raw error to current subscribers, e.g. a poison
    /// envelope that failed transport-level decoding.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn inject_error(&self, topic: &str, error: EventBusError) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(senders) = inner.subscribers.get_mut(topic) {
            senders.retain(|tx| tx.send(Err(error.clone())).is_ok());
        }
    }

    /// Make every subsequent publish to `topic` fail with `error`,
    /// simulating a broker outage on that topic.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn fail_publishes(&self, topic: &str, error: EventBusError) {
        let mut inner = self.inner.lock().unwrap();
        inner.publish_errors.insert(topic.to_string(), error);
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            #[allow(clippy::unwrap_used)] // test double; poisoned lock means a test already failed
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.publish_errors.get(&topic) {
                return Err(error.clone());
            }
            inner
                .published
                .entry(topic.clone())
                .or_default()
                .push(event.clone());
            if let Some(senders) = inner.subscribers.get_mut(&topic) {
                senders.retain(|tx| tx.send(Ok(event.clone())).is_ok());
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            {
                #[allow(clippy::unwrap_used)]
                let mut inner = self.inner.lock().unwrap();
                for topic in &topics {
                    inner
                        .subscribers
                        .entry(topic.clone())
                        .or_default()
                        .push(tx.clone());
                }
            }

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn envelope(event_type: &str, key: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), vec![1, 2, 3], key.to_string())
    }

    #[tokio::test]
    async fn publish_records_and_delivers() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["patient.created"]).await.unwrap();

        bus.publish("patient.created", &envelope("PATIENT_CREATED", "p-1"))
            .await
            .unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.event_type, "PATIENT_CREATED");
        assert_eq!(bus.published("patient.created").len(), 1);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = InMemoryEventBus::new();
        bus.publish("patient.created", &envelope("PATIENT_CREATED", "p-1"))
            .await
            .unwrap();

        let mut stream = bus.subscribe(&["patient.created"]).await.unwrap();
        bus.publish("patient.created", &envelope("PATIENT_CREATED", "p-2"))
            .await
            .unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.key, "p-2");
    }

    #[tokio::test]
    async fn redeliver_does_not_record() {
        let bus = InMemoryEventBus::new();
        let event = envelope("PATIENT_UPDATED", "p-1");
        let mut stream = bus.subscribe(&["patient.updated"]).await.unwrap();

        bus.publish("patient.updated", &event).await.unwrap();
        bus.redeliver("patient.updated", &event);

        assert_eq!(bus.published("patient.updated").len(), 1);
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
    }
}
