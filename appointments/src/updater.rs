//! Cached patient projection updater.
//!
//! Consumes patient lifecycle events and overwrites the local
//! projection wholesale, keyed by patient id. The overwrite is what
//! makes the updater idempotent: replaying an event converges to the
//! same projection state. Per-patient ordering comes from the
//! partition key, so the latest arrival always wins.

use futures::StreamExt;
use patientcare_core::environment::{Clock, SystemClock};
use patientcare_core::event::{topics, Event, PatientEvent, SerializedEvent};
use patientcare_core::event_bus::{EventBus, EventBusError};
use patientcare_core::projection::{PatientProjection, PatientProjectionStore};
use patientcare_postgres::DeadLetterQueue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Consumer group shared by appointment service instances, so
/// partitions are split across them instead of duplicated.
pub const CONSUMER_GROUP: &str = "appointment-service";

/// Where undecodable events are parked.
///
/// Implemented by the Postgres [`DeadLetterQueue`]; tests substitute an
/// in-memory sink. Recording failures is best-effort and must not stop
/// the consumer loop.
pub trait DeadLetterSink: Send + Sync {
    /// Park an event that failed processing.
    fn record(
        &self,
        topic: &str,
        event: &SerializedEvent,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl DeadLetterSink for DeadLetterQueue {
    fn record(
        &self,
        topic: &str,
        event: &SerializedEvent,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let error = error.to_string();
        Box::pin(async move {
            if let Err(e) = self.add_entry(&topic, &event, &error).await {
                tracing::error!(topic = %topic, error = %e, "failed to record dead letter");
            }
        })
    }
}

/// Subscribes to patient lifecycle topics and maintains the projection.
pub struct ProjectionUpdater {
    event_bus: Arc<dyn EventBus>,
    store: Arc<dyn PatientProjectionStore>,
    clock: Arc<dyn Clock>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl ProjectionUpdater {
    /// Create an updater with the system clock and no dead letter sink.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, store: Arc<dyn PatientProjectionStore>) -> Self {
        Self {
            event_bus,
            store,
            clock: Arc::new(SystemClock),
            dead_letters: None,
        }
    }

    /// Override the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Park undecodable events in the given sink instead of only
    /// logging them.
    #[must_use]
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Run the consumer loop until the subscription stream ends.
    ///
    /// Individual event failures never end the loop: undecodable events
    /// are parked and dropped, storage failures are logged and the
    /// event is dropped (redelivery re-applies it).
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] only if the
    /// subscription itself cannot be established.
    pub async fn run(&self) -> Result<(), EventBusError> {
        let mut stream = self
            .event_bus
            .subscribe(&[topics::PATIENT_CREATED, topics::PATIENT_UPDATED])
            .await?;

        tracing::info!(consumer_group = CONSUMER_GROUP, "projection updater started");

        while let Some(result) = stream.next().await {
            match result {
                Ok(envelope) => self.apply(envelope).await,
                Err(e) => {
                    tracing::warn!(error = %e, "event stream error, continuing");
                }
            }
        }

        tracing::info!("projection updater stream ended");
        Ok(())
    }

    /// Apply a single envelope to the projection.
    ///
    /// Public so callers (and tests) can drive the updater without a
    /// live subscription.
    pub async fn apply(&self, envelope: SerializedEvent) {
        if envelope.event_type != "PATIENT_CREATED" && envelope.event_type != "PATIENT_UPDATED" {
            self.park(&envelope, "unexpected event type on patient topic")
                .await;
            return;
        }

        let event = match PatientEvent::from_bytes(&envelope.data) {
            Ok(event) => event,
            Err(e) => {
                self.park(&envelope, &e.to_string()).await;
                return;
            }
        };

        let projection = PatientProjection::from_event(&event, self.clock.now());
        match self.store.upsert(&projection).await {
            Ok(()) => {
                tracing::debug!(
                    patient_id = %projection.patient_id,
                    event_type = %envelope.event_type,
                    "projection updated"
                );
                metrics::counter!("patientcare.projection.applied").increment(1);
            }
            Err(e) => {
                // Dropped here; at-least-once redelivery re-applies it.
                tracing::error!(
                    patient_id = %projection.patient_id,
                    error = %e,
                    "failed to upsert projection"
                );
            }
        }
    }

    async fn park(&self, envelope: &SerializedEvent, error: &str) {
        tracing::warn!(
            event_type = %envelope.event_type,
            key = %envelope.key,
            error = error,
            "dropping undecodable event"
        );
        metrics::counter!("patientcare.projection.dead_lettered").increment(1);
        if let Some(sink) = &self.dead_letters {
            let topic = match envelope.event_type.as_str() {
                "PATIENT_UPDATED" => topics::PATIENT_UPDATED,
                _ => topics::PATIENT_CREATED,
            };
            sink.record(topic, envelope, error).await;
        }
    }
}
