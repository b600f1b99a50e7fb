//! Cached patient projection for dependent services.
//!
//! A projection is a derived, eventually-consistent, read-optimized copy
//! of the authoritative patient record. It is overwritten wholesale on
//! every lifecycle event for its id (no merge semantics), which makes the
//! updater naturally idempotent under at-least-once delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::event::PatientEvent;
use crate::patient::PatientId;

/// Error type for projection storage operations.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Denormalized patient view held locally by a dependent service.
///
/// Never authoritative. Used to resolve patient display names without a
/// live RPC back to the patient service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProjection {
    /// Patient id (projection key).
    pub patient_id: PatientId,
    /// Patient full name.
    pub full_name: String,
    /// Patient email.
    pub email: String,
    /// When this copy was last written.
    pub updated_at: DateTime<Utc>,
}

impl PatientProjection {
    /// Build the projection state carried by a lifecycle event.
    ///
    /// `updated_at` is the arrival time, not the event's emission time:
    /// last-write-wins is by arrival order.
    #[must_use]
    pub fn from_event(event: &PatientEvent, now: DateTime<Utc>) -> Self {
        Self {
            patient_id: event.patient_id,
            full_name: event.name.clone(),
            email: event.email.clone(),
            updated_at: now,
        }
    }
}

/// Storage seam for the patient projection.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the store can be
/// shared as `Arc<dyn PatientProjectionStore>` between the updater and
/// the appointment service.
pub trait PatientProjectionStore: Send + Sync {
    /// Insert or overwrite the projection for its patient id.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails.
    fn upsert(
        &self,
        projection: &PatientProjection,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;

    /// Look up the projection for a patient.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the read fails.
    fn get(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PatientProjection>, ProjectionError>> + Send + '_>>;

    /// Remove the projection for a patient.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the delete fails.
    fn delete(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;
}
