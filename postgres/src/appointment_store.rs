//! Appointment row store with version-column optimistic concurrency.
//!
//! Version arbitration happens in the UPDATE itself: the row only
//! changes when the stored version still equals the writer's expected
//! version, and the version advances by exactly 1 in the same statement.
//! Two concurrent writers can both read version N, but only one UPDATE
//! matches; the loser gets [`StoreError::VersionConflict`].

use chrono::{DateTime, Utc};
use patientcare_core::appointment::{Appointment, AppointmentId};
use patientcare_core::patient::PatientId;
use patientcare_core::store::{AppointmentStore, Page, PageRequest, SortDir, StoreError};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::map_sqlx_error;

/// `PostgreSQL`-backed [`AppointmentStore`].
#[derive(Clone)]
pub struct PostgresAppointmentStore {
    pool: PgPool,
}

impl PostgresAppointmentStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_appointment(row: &sqlx::postgres::PgRow) -> Appointment {
        let id: Uuid = row.get("id");
        let patient_id: Uuid = row.get("patient_id");
        Appointment {
            id: AppointmentId::from_uuid(id),
            patient_id: PatientId::from_uuid(patient_id),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            reason: row.get("reason"),
            version: row.get("version"),
        }
    }
}

impl AppointmentStore for PostgresAppointmentStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO appointments (id, patient_id, start_time, end_time, reason, version)
            VALUES ($1, $2, $3, $4, $5, 0)
            ",
        )
        .bind(appointment.id.as_uuid())
        .bind(appointment.patient_id.as_uuid())
        .bind(appointment.start_time)
        .bind(appointment.end_time)
        .bind(&appointment.reason)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        tracing::debug!(appointment_id = %appointment.id, "appointment row inserted");
        Ok(())
    }

    async fn update(
        &self,
        appointment: &Appointment,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        // Compare-and-swap: the WHERE clause arbitrates between
        // concurrent writers.
        let row = sqlx::query(
            r"
            UPDATE appointments
            SET start_time = $3, end_time = $4, reason = $5, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            ",
        )
        .bind(appointment.id.as_uuid())
        .bind(expected_version)
        .bind(appointment.start_time)
        .bind(appointment.end_time)
        .bind(&appointment.reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        if let Some(row) = row {
            return Ok(row.get("version"));
        }

        // No row matched: either the id is gone or another writer
        // advanced the version first.
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM appointments WHERE id = $1)")
                .bind(appointment.id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, None))?;

        if exists {
            Err(StoreError::VersionConflict {
                entity: "appointment",
                id: appointment.id.to_string(),
                expected: expected_version,
            })
        } else {
            Err(StoreError::RowNotFound {
                entity: "appointment",
                id: appointment.id.to_string(),
            })
        }
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, patient_id, start_time, end_time, reason, version
            FROM appointments
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        Ok(row.as_ref().map(Self::row_to_appointment))
    }

    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request: &PageRequest,
    ) -> Result<Page<Appointment>, StoreError> {
        let direction = match request.sort_dir {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };

        // Appointments only sort by start time; the sort field on the
        // request is ignored here.
        let list_sql = format!(
            "SELECT id, patient_id, start_time, end_time, reason, version \
             FROM appointments \
             WHERE start_time >= $1 AND start_time <= $2 \
             ORDER BY start_time {direction}, id ASC \
             LIMIT $3 OFFSET $4"
        );

        #[allow(clippy::cast_possible_wrap)] // page sizes are far below i64::MAX
        let rows = sqlx::query(&list_sql)
            .bind(from)
            .bind(to)
            .bind(i64::from(request.size))
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, None))?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM appointments WHERE start_time >= $1 AND start_time <= $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        let items = rows.iter().map(Self::row_to_appointment).collect();
        #[allow(clippy::cast_sign_loss)] // COUNT(*) is never negative
        Ok(Page::new(items, total as u64, request))
    }
}
