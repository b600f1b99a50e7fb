//! Projection updater behavior: idempotent replay, last-write-wins,
//! poison-message handling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use patientcare_appointments::{DeadLetterSink, ProjectionUpdater};
use patientcare_core::environment::Clock;
use patientcare_core::event::{
    topics, PatientEvent, PatientEventKind, SerializedEvent,
};
use patientcare_core::event_bus::EventBus;
use patientcare_core::patient::PatientId;
use patientcare_core::projection::PatientProjectionStore;
use patientcare_testing::{test_clock, InMemoryEventBus, InMemoryProjectionStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSink {
    fn entries(&self) -> Vec<(String, String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl DeadLetterSink for RecordingSink {
    fn record(
        &self,
        topic: &str,
        event: &SerializedEvent,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let entry = (
            topic.to_string(),
            event.event_type.clone(),
            error.to_string(),
        );
        Box::pin(async move {
            self.entries.lock().unwrap().push(entry);
        })
    }
}

fn lifecycle_envelope(patient_id: PatientId, name: &str, kind: PatientEventKind) -> SerializedEvent {
    let event = PatientEvent {
        patient_id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        kind,
        emitted_at: test_clock().now(),
    };
    SerializedEvent::from_event(&event).unwrap()
}

fn updater_with(
    store: Arc<InMemoryProjectionStore>,
    sink: Option<Arc<RecordingSink>>,
) -> ProjectionUpdater {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let updater = ProjectionUpdater::new(bus, store).with_clock(Arc::new(test_clock()));
    match sink {
        Some(sink) => updater.with_dead_letter_sink(sink),
        None => updater,
    }
}

#[tokio::test]
async fn created_event_populates_the_projection() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let updater = updater_with(store.clone(), None);
    let patient_id = PatientId::new();

    updater
        .apply(lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created))
        .await;

    let projection = store.get(patient_id).await.unwrap().unwrap();
    assert_eq!(projection.full_name, "Jane Doe");
    assert_eq!(projection.patient_id, patient_id);
}

#[tokio::test]
async fn replaying_an_event_is_idempotent() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let updater = updater_with(store.clone(), None);
    let patient_id = PatientId::new();
    let envelope = lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created);

    updater.apply(envelope.clone()).await;
    let once = store.get(patient_id).await.unwrap().unwrap();

    updater.apply(envelope).await;
    let twice = store.get(patient_id).await.unwrap().unwrap();

    assert_eq!(once, twice);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn later_arrival_wins() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let updater = updater_with(store.clone(), None);
    let patient_id = PatientId::new();

    updater
        .apply(lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created))
        .await;
    updater
        .apply(lifecycle_envelope(patient_id, "Jane Smith", PatientEventKind::Updated))
        .await;

    let projection = store.get(patient_id).await.unwrap().unwrap();
    assert_eq!(projection.full_name, "Jane Smith");
}

#[tokio::test]
async fn undecodable_event_is_parked_and_the_loop_survives() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let sink = Arc::new(RecordingSink::default());
    let updater = updater_with(store.clone(), Some(sink.clone()));

    let poison = SerializedEvent::new(
        "PATIENT_CREATED".to_string(),
        vec![0xde, 0xad, 0xbe, 0xef],
        "garbage".to_string(),
    );
    updater.apply(poison).await;

    // The poison message is parked, not applied.
    assert!(store.is_empty());
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, topics::PATIENT_CREATED);

    // A healthy event afterwards still applies.
    let patient_id = PatientId::new();
    updater
        .apply(lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created))
        .await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn unexpected_event_type_is_parked() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let sink = Arc::new(RecordingSink::default());
    let updater = updater_with(store.clone(), Some(sink.clone()));

    let stray = SerializedEvent::new(
        "BILLING_ACCOUNT_CREATE_REQUESTED".to_string(),
        vec![1, 2, 3],
        PatientId::new().to_string(),
    );
    updater.apply(stray).await;

    assert!(store.is_empty());
    assert_eq!(sink.entries().len(), 1);
}

#[tokio::test]
async fn run_consumes_published_lifecycle_events() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let updater = Arc::new(
        ProjectionUpdater::new(bus.clone(), store.clone()).with_clock(Arc::new(test_clock())),
    );

    let runner = updater.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    // Let the subscription register before publishing.
    tokio::task::yield_now().await;

    let patient_id = PatientId::new();
    bus.publish(
        topics::PATIENT_CREATED,
        &lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created),
    )
    .await
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if store.get(patient_id).await.unwrap().is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "projection never appeared");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    handle.abort();
}

#[tokio::test]
async fn run_survives_a_stream_error() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let updater = Arc::new(
        ProjectionUpdater::new(bus.clone(), store.clone()).with_clock(Arc::new(test_clock())),
    );

    let runner = updater.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;

    bus.inject_error(
        topics::PATIENT_CREATED,
        patientcare_core::event_bus::EventBusError::TransportError("connection reset".to_string()),
    );

    // The loop logs the error and keeps consuming.
    let patient_id = PatientId::new();
    bus.publish(
        topics::PATIENT_CREATED,
        &lifecycle_envelope(patient_id, "Jane Doe", PatientEventKind::Created),
    )
    .await
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if store.get(patient_id).await.unwrap().is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "projection never appeared");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    handle.abort();
}
