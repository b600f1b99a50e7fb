//! Persistent patient projection store for the appointment service.
//!
//! One row per patient, overwritten wholesale on every upsert. The
//! table survives restarts, so the projection does not need a rebuild
//! after a deploy; Kafka consumer-group offsets track what has already
//! been applied.

use patientcare_core::patient::PatientId;
use patientcare_core::projection::{PatientProjection, PatientProjectionStore, ProjectionError};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// `PostgreSQL`-backed [`PatientProjectionStore`].
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PatientProjectionStore for PostgresProjectionStore {
    fn upsert(
        &self,
        projection: &PatientProjection,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let projection = projection.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO patient_projections (patient_id, full_name, email, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (patient_id) DO UPDATE
                SET full_name = EXCLUDED.full_name,
                    email = EXCLUDED.email,
                    updated_at = EXCLUDED.updated_at
                ",
            )
            .bind(projection.patient_id.as_uuid())
            .bind(&projection.full_name)
            .bind(&projection.email)
            .bind(projection.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

            Ok(())
        })
    }

    fn get(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PatientProjection>, ProjectionError>> + Send + '_>>
    {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT patient_id, full_name, email, updated_at
                FROM patient_projections
                WHERE patient_id = $1
                ",
            )
            .bind(patient_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

            Ok(row.map(|row| {
                let id: Uuid = row.get("patient_id");
                PatientProjection {
                    patient_id: PatientId::from_uuid(id),
                    full_name: row.get("full_name"),
                    email: row.get("email"),
                    updated_at: row.get("updated_at"),
                }
            }))
        })
    }

    fn delete(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM patient_projections WHERE patient_id = $1")
                .bind(patient_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;

            Ok(())
        })
    }
}
