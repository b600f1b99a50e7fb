//! In-memory patient and appointment stores.
//!
//! Enforce the same invariants as the Postgres layer: the email unique
//! constraint on insert/update and the version compare-and-swap on
//! appointment updates, so service tests exercise real conflict paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock poisoning

use chrono::{DateTime, Utc};
use patientcare_core::appointment::{Appointment, AppointmentId};
use patientcare_core::patient::{Patient, PatientId};
use patientcare_core::store::{
    AppointmentStore, Page, PageRequest, PatientStore, SearchField, SearchFilter, SortDir,
    StoreError,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

/// In-memory [`PatientStore`] with a call counter for cache-hit
/// assertions.
#[derive(Clone, Default)]
pub struct InMemoryPatientStore {
    rows: Arc<Mutex<HashMap<PatientId, Patient>>>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryPatientStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list` calls served so far. A cached listing read must
    /// not increment this.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of stored patients.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_key(patient: &Patient, field: &str) -> String {
    match field {
        "email" => patient.email.to_lowercase(),
        "address" => patient.address.to_lowercase(),
        "date_of_birth" => patient.date_of_birth.to_string(),
        "registered_at" => patient.registered_at.to_rfc3339(),
        _ => patient.name.to_lowercase(),
    }
}

fn matches(patient: &Patient, filter: &SearchFilter) -> bool {
    let needle = filter.value.to_lowercase();
    let haystack = match filter.field {
        SearchField::Name => patient.name.to_lowercase(),
        SearchField::Address => patient.address.to_lowercase(),
        SearchField::Email => patient.email.to_lowercase(),
    };
    haystack.contains(&needle)
}

impl PatientStore for InMemoryPatientStore {
    async fn insert(&self, patient: &Patient) -> Result<(), StoreError> {
        #[allow(clippy::unwrap_used)]
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|p| p.email == patient.email) {
            return Err(StoreError::DuplicateEmail {
                email: patient.email.clone(),
            });
        }
        rows.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn update(&self, patient: &Patient) -> Result<(), StoreError> {
        #[allow(clippy::unwrap_used)]
        let mut rows = self.rows.lock().unwrap();
        if !rows.contains_key(&patient.id) {
            return Err(StoreError::RowNotFound {
                entity: "patient",
                id: patient.id.to_string(),
            });
        }
        if rows
            .values()
            .any(|p| p.email == patient.email && p.id != patient.id)
        {
            return Err(StoreError::DuplicateEmail {
                email: patient.email.clone(),
            });
        }
        rows.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn delete(&self, id: PatientId) -> Result<(), StoreError> {
        #[allow(clippy::unwrap_used)]
        let mut rows = self.rows.lock().unwrap();
        rows.remove(&id).map(|_| ()).ok_or(StoreError::RowNotFound {
            entity: "patient",
            id: id.to_string(),
        })
    }

    async fn find_by_id(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        #[allow(clippy::unwrap_used)]
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&id).cloned())
    }

    async fn email_exists(
        &self,
        email: &str,
        excluding: Option<PatientId>,
    ) -> Result<bool, StoreError> {
        #[allow(clippy::unwrap_used)]
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .any(|p| p.email == email && Some(p.id) != excluding))
    }

    async fn list(
        &self,
        request: &PageRequest,
        filter: Option<&SearchFilter>,
    ) -> Result<Page<Patient>, StoreError> {
        self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);

        #[allow(clippy::unwrap_used)]
        let rows = self.rows.lock().unwrap();
        let mut selected: Vec<Patient> = rows
            .values()
            .filter(|p| filter.map_or(true, |f| matches(p, f)))
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            let ord = sort_key(a, &request.sort_field).cmp(&sort_key(b, &request.sort_field));
            match request.sort_dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        let total = selected.len() as u64;
        let items: Vec<Patient> = selected
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .collect();

        Ok(Page::new(items, total, request))
    }
}

/// In-memory [`AppointmentStore`] with version compare-and-swap.
#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    rows: Arc<Mutex<HashMap<AppointmentId, Appointment>>>,
}

impl InMemoryAppointmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        #[allow(clippy::unwrap_used)]
        let mut rows = self.rows.lock().unwrap();
        let mut row = appointment.clone();
        row.version = 0;
        rows.insert(row.id, row);
        Ok(())
    }

    async fn update(
        &self,
        appointment: &Appointment,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        // The whole compare-and-swap happens under one lock, like a
        // single UPDATE ... WHERE version = $n statement.
        #[allow(clippy::unwrap_used)]
        let mut rows = self.rows.lock().unwrap();
        let Some(current) = rows.get(&appointment.id) else {
            return Err(StoreError::RowNotFound {
                entity: "appointment",
                id: appointment.id.to_string(),
            });
        };

        match current.version.cmp(&expected_version) {
            Ordering::Equal => {
                let mut row = appointment.clone();
                row.version = expected_version + 1;
                let new_version = row.version;
                rows.insert(row.id, row);
                Ok(new_version)
            }
            _ => Err(StoreError::VersionConflict {
                entity: "appointment",
                id: appointment.id.to_string(),
                expected: expected_version,
            }),
        }
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        #[allow(clippy::unwrap_used)]
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&id).cloned())
    }

    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request: &PageRequest,
    ) -> Result<Page<Appointment>, StoreError> {
        #[allow(clippy::unwrap_used)]
        let rows = self.rows.lock().unwrap();
        let mut selected: Vec<Appointment> = rows
            .values()
            .filter(|a| a.start_time >= from && a.start_time <= to)
            .cloned()
            .collect();

        selected.sort_by_key(|a| a.start_time);
        if request.sort_dir == SortDir::Desc {
            selected.reverse();
        }

        let total = selected.len() as u64;
        let items: Vec<Appointment> = selected
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .collect();

        Ok(Page::new(items, total, request))
    }
}
