//! Appointment domain model.
//!
//! Appointments are owned by the appointment subsystem. They hold a weak
//! reference to a patient (resolved for display via the cached
//! projection, never via live RPC) and a version counter advanced by the
//! store on every successful update for optimistic concurrency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::patient::PatientId;

/// Opaque unique appointment identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(Uuid);

impl AppointmentId {
    /// Create a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AppointmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An appointment record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    /// Unique identifier.
    pub id: AppointmentId,
    /// The patient this appointment is for (weak reference).
    pub patient_id: PatientId,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end.
    pub end_time: DateTime<Utc>,
    /// Reason for the visit.
    pub reason: String,
    /// Monotonic version counter, advanced by the store on every
    /// successful update. A stale writer fails with
    /// `ConcurrentModification` instead of silently overwriting.
    pub version: i64,
}

impl Appointment {
    /// Create a new appointment at version 0.
    #[must_use]
    pub fn new(
        patient_id: PatientId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: AppointmentId::new(),
            patient_id,
            start_time,
            end_time,
            reason: reason.into(),
            version: 0,
        }
    }
}

/// Appointment joined with the patient name resolved from the cached
/// projection.
///
/// `patient_name` is `None` when the projection is cold or stale for this
/// patient; listings never fail for that reason alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentView {
    /// The underlying appointment.
    pub appointment: Appointment,
    /// Display name from the projection, if present.
    pub patient_name: Option<String>,
}
