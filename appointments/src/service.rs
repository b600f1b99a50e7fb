//! Appointment scheduling and queries.

use chrono::{DateTime, Utc};
use patientcare_core::appointment::{Appointment, AppointmentId, AppointmentView};
use patientcare_core::error::{Result, ServiceError};
use patientcare_core::patient::PatientId;
use patientcare_core::projection::PatientProjectionStore;
use patientcare_core::store::{AppointmentStore, Page, PageRequest};
use std::sync::Arc;

/// Appointment write/read service.
///
/// Updates go through the store's version compare-and-swap: a stale
/// writer gets [`ServiceError::ConcurrentModification`] instead of
/// silently overwriting. Reads resolve patient display names from the
/// local projection; a cold projection yields `None`, never an error.
pub struct AppointmentService<S> {
    store: S,
    projections: Arc<dyn PatientProjectionStore>,
}

impl<S: AppointmentStore> AppointmentService<S> {
    /// Create a service over an appointment store and the projection.
    #[must_use]
    pub const fn new(store: S, projections: Arc<dyn PatientProjectionStore>) -> Self {
        Self { store, projections }
    }

    /// Schedule a new appointment at version 0.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] if the time range is
    /// inverted or empty.
    pub async fn schedule_appointment(
        &self,
        patient_id: PatientId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: impl Into<String> + Send,
    ) -> Result<Appointment> {
        if end_time <= start_time {
            return Err(ServiceError::Validation {
                field: "end_time",
                message: "end time must be after start time".to_string(),
            });
        }

        let appointment = Appointment::new(patient_id, start_time, end_time, reason);
        self.store.insert(&appointment).await?;
        tracing::info!(
            appointment_id = %appointment.id,
            patient_id = %patient_id,
            "appointment scheduled"
        );
        Ok(appointment)
    }

    /// Update an appointment read at `expected_version`.
    ///
    /// On success the returned appointment carries a version advanced
    /// by exactly 1.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ConcurrentModification`] if another
    /// writer advanced the version first, [`ServiceError::NotFound`] if
    /// the id is absent, or [`ServiceError::Validation`] on an inverted
    /// time range.
    pub async fn update_appointment(
        &self,
        id: AppointmentId,
        expected_version: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: impl Into<String> + Send,
    ) -> Result<Appointment> {
        if end_time <= start_time {
            return Err(ServiceError::Validation {
                field: "end_time",
                message: "end time must be after start time".to_string(),
            });
        }

        let existing = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "appointment",
                id: id.to_string(),
            })?;

        let mut updated = Appointment {
            id,
            patient_id: existing.patient_id,
            start_time,
            end_time,
            reason: reason.into(),
            version: expected_version,
        };

        let new_version = self.store.update(&updated, expected_version).await?;
        updated.version = new_version;
        tracing::info!(
            appointment_id = %id,
            version = new_version,
            "appointment updated"
        );
        Ok(updated)
    }

    /// Look up a single appointment with its resolved patient name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the id is absent.
    pub async fn get_appointment(&self, id: AppointmentId) -> Result<AppointmentView> {
        let appointment = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "appointment",
                id: id.to_string(),
            })?;

        let patient_name = self.resolve_name(appointment.patient_id).await;
        Ok(AppointmentView {
            appointment,
            patient_name,
        })
    }

    /// Paginated listing of appointments starting within `[from, to]`,
    /// with patient names resolved from the projection.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] if the store query fails.
    pub async fn get_appointments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request: &PageRequest,
    ) -> Result<Page<AppointmentView>> {
        let page = self.store.list_between(from, to, request).await?;

        let mut views = Vec::with_capacity(page.items.len());
        for appointment in &page.items {
            let patient_name = self.resolve_name(appointment.patient_id).await;
            views.push(AppointmentView {
                appointment: appointment.clone(),
                patient_name,
            });
        }

        Ok(Page {
            items: views,
            total_elements: page.total_elements,
            total_pages: page.total_pages,
            page_number: page.page_number,
            page_size: page.page_size,
        })
    }

    /// Resolve a display name from the projection. Lookup failures and
    /// missing projections both yield `None`; listings never fail
    /// because the projection is cold or stale.
    async fn resolve_name(&self, patient_id: PatientId) -> Option<String> {
        match self.projections.get(patient_id).await {
            Ok(Some(projection)) => Some(projection.full_name),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "projection lookup failed");
                None
            }
        }
    }
}
