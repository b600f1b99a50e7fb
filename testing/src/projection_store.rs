//! In-memory patient projection store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock poisoning

use patientcare_core::patient::PatientId;
use patientcare_core::projection::{PatientProjection, PatientProjectionStore, ProjectionError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// In-memory [`PatientProjectionStore`] for updater and appointment
/// service tests.
#[derive(Clone, Default)]
pub struct InMemoryProjectionStore {
    rows: Arc<Mutex<HashMap<PatientId, PatientProjection>>>,
}

impl InMemoryProjectionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored projections.
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

impl PatientProjectionStore for InMemoryProjectionStore {
    fn upsert(
        &self,
        projection: &PatientProjection,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let projection = projection.clone();
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            let mut rows = self.rows.lock().unwrap();
            rows.insert(projection.patient_id, projection);
            Ok(())
        })
    }

    fn get(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PatientProjection>, ProjectionError>> + Send + '_>>
    {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(&patient_id).cloned())
        })
    }

    fn delete(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            let mut rows = self.rows.lock().unwrap();
            rows.remove(&patient_id);
            Ok(())
        })
    }
}
