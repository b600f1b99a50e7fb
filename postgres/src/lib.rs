//! `PostgreSQL` persistence for the patientcare services.
//!
//! Implements the storage seams from `patientcare-core` with sqlx:
//!
//! - [`PostgresPatientStore`] — authoritative patient rows with a unique
//!   email constraint
//! - [`PostgresAppointmentStore`] — appointment rows with a version
//!   column for optimistic concurrency
//! - [`PostgresProjectionStore`] — the appointment service's local copy
//!   of patient display data
//! - [`DeadLetterQueue`] — undecodable events parked for operators
//!
//! Schema lives under `migrations/` and is applied with `sqlx migrate`.
//!
//! # Example
//!
//! ```ignore
//! use patientcare_postgres::PostgresPatientStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPoolOptions::new()
//!         .max_connections(10)
//!         .connect("postgres://localhost/patientcare")
//!         .await?;
//!     let store = PostgresPatientStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod appointment_store;
mod dead_letter_queue;
mod patient_store;
mod projection_store;

pub use appointment_store::PostgresAppointmentStore;
pub use dead_letter_queue::{DeadLetterQueue, DlqStatus, FailedEvent};
pub use patient_store::PostgresPatientStore;
pub use projection_store::PostgresProjectionStore;

use patientcare_core::store::StoreError;

/// Map a sqlx error to [`StoreError`], turning unique violations into
/// [`StoreError::DuplicateEmail`].
pub(crate) fn map_sqlx_error(e: sqlx::Error, email: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateEmail {
                email: email.unwrap_or_default().to_string(),
            };
        }
    }
    StoreError::Database(e.to_string())
}
