//! Event bus abstraction for cross-service propagation.
//!
//! Publishing happens after the local persistence commit; delivery is
//! at-least-once, ordered only within a partition (partition key =
//! patient id). Subscribers must be idempotent.
//!
//! Implementations:
//! - `InMemoryEventBus` in `patientcare-testing` (fast, deterministic)
//! - `RedpandaEventBus` in `patientcare-redpanda` (Kafka-compatible)

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// A received message did not decode to an envelope.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Stream of envelopes from a subscription.
///
/// Each item is either an envelope or a transport/decode error. Errors
/// are delivered in-stream so a consumer loop can log and continue; the
/// stream itself only ends when the subscription is dropped.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Publish/subscribe seam over the shared durable channel.
///
/// # Delivery contract
///
/// - **At-least-once**: an envelope may be delivered more than once
/// - **Ordered per partition**: envelopes with the same key arrive in
///   publish order; across keys there is no guarantee
/// - **Idempotent consumers**: replays must converge to the same state
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the bus can be shared
/// as `Arc<dyn EventBus>` across the command service and the billing
/// client.
pub trait EventBus: Send + Sync {
    /// Publish an envelope to a topic, partitioned by `event.key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish fails.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of envelopes.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription
    /// fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
