//! Patient row store.
//!
//! The `patients.email` unique index is the authority on email
//! uniqueness; [`PatientStore::email_exists`] is only the advisory
//! pre-check that lets the service answer with a friendly conflict
//! before attempting the write.

use chrono::{DateTime, NaiveDate, Utc};
use patientcare_core::patient::{Patient, PatientId};
use patientcare_core::store::{
    Page, PageRequest, PatientStore, SearchField, SearchFilter, SortDir, StoreError,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::map_sqlx_error;

/// Columns a listing may sort by. Anything outside this set falls back
/// to `name`; the sort field arrives from the query surface and is never
/// interpolated unchecked.
fn sort_column(field: &str) -> &'static str {
    match field.to_ascii_lowercase().as_str() {
        "email" => "email",
        "address" => "address",
        "dateofbirth" | "date_of_birth" => "date_of_birth",
        "registeredat" | "registered_at" | "registereddate" => "registered_at",
        _ => "name",
    }
}

const fn filter_column(field: SearchField) -> &'static str {
    match field {
        SearchField::Name => "name",
        SearchField::Address => "address",
        SearchField::Email => "email",
    }
}

/// `PostgreSQL`-backed [`PatientStore`].
#[derive(Clone)]
pub struct PostgresPatientStore {
    pool: PgPool,
}

impl PostgresPatientStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_patient(row: &sqlx::postgres::PgRow) -> Patient {
        let id: Uuid = row.get("id");
        let date_of_birth: NaiveDate = row.get("date_of_birth");
        let registered_at: DateTime<Utc> = row.get("registered_at");
        Patient {
            id: PatientId::from_uuid(id),
            name: row.get("name"),
            email: row.get("email"),
            address: row.get("address"),
            date_of_birth,
            registered_at,
        }
    }
}

impl PatientStore for PostgresPatientStore {
    async fn insert(&self, patient: &Patient) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO patients (id, name, email, address, date_of_birth, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(patient.id.as_uuid())
        .bind(&patient.name)
        .bind(&patient.email)
        .bind(&patient.address)
        .bind(patient.date_of_birth)
        .bind(patient.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, Some(&patient.email)))?;

        tracing::debug!(patient_id = %patient.id, "patient row inserted");
        Ok(())
    }

    async fn update(&self, patient: &Patient) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE patients
            SET name = $2, email = $3, address = $4, date_of_birth = $5
            WHERE id = $1
            ",
        )
        .bind(patient.id.as_uuid())
        .bind(&patient.name)
        .bind(&patient.email)
        .bind(&patient.address)
        .bind(patient.date_of_birth)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, Some(&patient.email)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "patient",
                id: patient.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: PatientId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, None))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                entity: "patient",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_by_id(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, address, date_of_birth, registered_at
            FROM patients
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        Ok(row.as_ref().map(Self::row_to_patient))
    }

    async fn email_exists(
        &self,
        email: &str,
        excluding: Option<PatientId>,
    ) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM patients
                WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            ",
        )
        .bind(email)
        .bind(excluding.map(|id| id.as_uuid()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, None))?;

        Ok(exists)
    }

    async fn list(
        &self,
        request: &PageRequest,
        filter: Option<&SearchFilter>,
    ) -> Result<Page<Patient>, StoreError> {
        let column = sort_column(&request.sort_field);
        let direction = match request.sort_dir {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };

        // Column names come from fixed whitelists above; only the filter
        // value and paging parameters are bound.
        let (where_clause, pattern) = match filter {
            Some(f) => (
                format!("WHERE {} ILIKE $3", filter_column(f.field)),
                Some(format!("%{}%", f.value)),
            ),
            None => (String::new(), None),
        };

        let list_sql = format!(
            "SELECT id, name, email, address, date_of_birth, registered_at \
             FROM patients {where_clause} \
             ORDER BY {column} {direction}, id ASC \
             LIMIT $1 OFFSET $2"
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM patients {}",
            where_clause.replace("$3", "$1")
        );

        #[allow(clippy::cast_possible_wrap)] // page sizes are far below i64::MAX
        let mut list_query = sqlx::query(&list_sql)
            .bind(i64::from(request.size))
            .bind(request.offset() as i64);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(p) = &pattern {
            list_query = list_query.bind(p);
            count_query = count_query.bind(p);
        }

        let rows = list_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, None))?;
        let (total,): (i64,) = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, None))?;

        let items = rows.iter().map(Self::row_to_patient).collect();
        #[allow(clippy::cast_sign_loss)] // COUNT(*) is never negative
        Ok(Page::new(items, total as u64, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_whitelists_known_fields() {
        assert_eq!(sort_column("email"), "email");
        assert_eq!(sort_column("dateOfBirth"), "date_of_birth");
        assert_eq!(sort_column("registeredAt"), "registered_at");
    }

    #[test]
    fn sort_column_falls_back_to_name() {
        assert_eq!(sort_column("name"), "name");
        assert_eq!(sort_column("ssn; DROP TABLE patients"), "name");
        assert_eq!(sort_column(""), "name");
    }

    #[test]
    fn filter_columns_match_search_fields() {
        assert_eq!(filter_column(SearchField::Name), "name");
        assert_eq!(filter_column(SearchField::Address), "address");
        assert_eq!(filter_column(SearchField::Email), "email");
    }
}
