//! Service-level error taxonomy.
//!
//! Failure categories are distinguishable by the caller without string
//! inspection. Billing unavailability never appears here: it is absorbed
//! into the deferred-provisioning path before reaching the caller.

use thiserror::Error;

use crate::billing::BillingError;
use crate::store::StoreError;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures surfaced by the patientcare services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A referenced entity is absent (client error).
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier that missed.
        id: String,
    },

    /// Duplicate email or duplicate billing account (client error).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input, with field-level detail (client error).
    #[error("validation failed on '{field}': {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A concurrent writer advanced the record's version first (client
    /// error; the read was stale).
    #[error("concurrent modification of {entity} {id}: expected version {expected}")]
    ConcurrentModification {
        /// Entity kind.
        entity: &'static str,
        /// Record identifier.
        id: String,
        /// The stale version the writer held.
        expected: i64,
    },

    /// A billing failure other than unavailability (service error).
    #[error("billing service failure: {0}")]
    Upstream(#[from] BillingError),

    /// Persistence failure (service error).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServiceError {
    /// Whether this failure was caused by the caller's input or timing
    /// (vs. an internal/upstream fault).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict(_)
                | Self::Validation { .. }
                | Self::ConcurrentModification { .. }
        )
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail { email } => {
                Self::Conflict(format!("a patient with email '{email}' already exists"))
            }
            StoreError::RowNotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::VersionConflict {
                entity,
                id,
                expected,
            } => Self::ConcurrentModification {
                entity,
                id,
                expected,
            },
            StoreError::Database(message) => Self::Storage(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_email_maps_to_conflict() {
        let err: ServiceError = StoreError::DuplicateEmail {
            email: "jane@example.com".to_string(),
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn version_conflict_maps_to_concurrent_modification() {
        let err: ServiceError = StoreError::VersionConflict {
            entity: "appointment",
            id: "a-1".to_string(),
            expected: 3,
        }
        .into();
        assert!(matches!(
            err,
            ServiceError::ConcurrentModification { expected: 3, .. }
        ));
    }

    #[test]
    fn upstream_is_not_a_client_error() {
        let err = ServiceError::Upstream(BillingError::Timeout);
        assert!(!err.is_client_error());
    }
}
