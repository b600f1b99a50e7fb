//! Appointment service behavior: optimistic concurrency and name
//! resolution from the projection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration as ChronoDuration, Utc};
use patientcare_appointments::AppointmentService;
use patientcare_core::appointment::AppointmentId;
use patientcare_core::environment::Clock;
use patientcare_core::error::ServiceError;
use patientcare_core::patient::PatientId;
use patientcare_core::projection::{PatientProjection, PatientProjectionStore};
use patientcare_core::store::{AppointmentStore, PageRequest, SortDir};
use patientcare_testing::{test_clock, InMemoryAppointmentStore, InMemoryProjectionStore};
use std::sync::Arc;

fn service() -> (
    AppointmentService<InMemoryAppointmentStore>,
    InMemoryAppointmentStore,
    Arc<InMemoryProjectionStore>,
) {
    let store = InMemoryAppointmentStore::new();
    let projections = Arc::new(InMemoryProjectionStore::new());
    let service = AppointmentService::new(store.clone(), projections.clone());
    (service, store, projections)
}

fn page_request() -> PageRequest {
    PageRequest::new(1, 10, SortDir::Asc, "start_time")
}

#[tokio::test]
async fn scheduling_starts_at_version_zero() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let appointment = service
        .schedule_appointment(
            PatientId::new(),
            now,
            now + ChronoDuration::minutes(30),
            "checkup",
        )
        .await
        .unwrap();

    assert_eq!(appointment.version, 0);
    assert_eq!(appointment.reason, "checkup");
}

#[tokio::test]
async fn inverted_time_range_is_rejected() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let result = service
        .schedule_appointment(PatientId::new(), now, now - ChronoDuration::minutes(5), "x")
        .await;

    assert!(matches!(
        result,
        Err(ServiceError::Validation { field: "end_time", .. })
    ));
}

#[tokio::test]
async fn successful_update_advances_version_by_one() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let appointment = service
        .schedule_appointment(
            PatientId::new(),
            now,
            now + ChronoDuration::minutes(30),
            "checkup",
        )
        .await
        .unwrap();

    let updated = service
        .update_appointment(
            appointment.id,
            appointment.version,
            now + ChronoDuration::hours(1),
            now + ChronoDuration::hours(2),
            "rescheduled",
        )
        .await
        .unwrap();

    assert_eq!(updated.version, appointment.version + 1);
    assert_eq!(updated.reason, "rescheduled");
}

#[tokio::test]
async fn concurrent_updates_from_the_same_version_yield_one_winner() {
    let (service, store, _) = service();
    let now = test_clock().now();

    let appointment = service
        .schedule_appointment(
            PatientId::new(),
            now,
            now + ChronoDuration::minutes(30),
            "checkup",
        )
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.update_appointment(
            appointment.id,
            0,
            now + ChronoDuration::hours(1),
            now + ChronoDuration::hours(2),
            "writer A",
        ),
        service.update_appointment(
            appointment.id,
            0,
            now + ChronoDuration::hours(3),
            now + ChronoDuration::hours(4),
            "writer B",
        ),
    );

    let results = [a, b];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser,
        Err(ServiceError::ConcurrentModification { expected: 0, .. })
    ));

    // Exactly one successful write advanced the version by exactly 1.
    let stored = store.find_by_id(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn stale_writer_fails_after_a_committed_update() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let appointment = service
        .schedule_appointment(
            PatientId::new(),
            now,
            now + ChronoDuration::minutes(30),
            "checkup",
        )
        .await
        .unwrap();

    service
        .update_appointment(
            appointment.id,
            0,
            now + ChronoDuration::hours(1),
            now + ChronoDuration::hours(2),
            "first",
        )
        .await
        .unwrap();

    let stale = service
        .update_appointment(
            appointment.id,
            0,
            now + ChronoDuration::hours(5),
            now + ChronoDuration::hours(6),
            "stale",
        )
        .await;

    assert!(matches!(
        stale,
        Err(ServiceError::ConcurrentModification { expected: 0, .. })
    ));
}

#[tokio::test]
async fn update_of_missing_appointment_is_not_found() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let result = service
        .update_appointment(
            AppointmentId::new(),
            0,
            now,
            now + ChronoDuration::minutes(30),
            "ghost",
        )
        .await;

    assert!(matches!(result, Err(ServiceError::NotFound { .. })));
}

#[tokio::test]
async fn listing_resolves_names_from_the_projection() {
    let (service, _, projections) = service();
    let now = test_clock().now();

    let known = PatientId::new();
    let unknown = PatientId::new();
    projections
        .upsert(&PatientProjection {
            patient_id: known,
            full_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            updated_at: now,
        })
        .await
        .unwrap();

    service
        .schedule_appointment(known, now, now + ChronoDuration::minutes(30), "checkup")
        .await
        .unwrap();
    service
        .schedule_appointment(
            unknown,
            now + ChronoDuration::hours(1),
            now + ChronoDuration::hours(2),
            "intake",
        )
        .await
        .unwrap();

    let page = service
        .get_appointments(now, now + ChronoDuration::days(1), &page_request())
        .await
        .unwrap();

    assert_eq!(page.total_elements, 2);
    let names: Vec<Option<&str>> = page
        .items
        .iter()
        .map(|v| v.patient_name.as_deref())
        .collect();
    // Sorted ascending by start time: the known patient comes first.
    assert_eq!(names, vec![Some("Jane Doe"), None]);
}

#[tokio::test]
async fn single_appointment_view_tolerates_a_cold_projection() {
    let (service, _, _) = service();
    let now = test_clock().now();

    let appointment = service
        .schedule_appointment(
            PatientId::new(),
            now,
            now + ChronoDuration::minutes(30),
            "checkup",
        )
        .await
        .unwrap();

    let view = service.get_appointment(appointment.id).await.unwrap();
    assert_eq!(view.appointment, appointment);
    assert_eq!(view.patient_name, None);
}
