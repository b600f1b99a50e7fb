//! Patient domain model.
//!
//! The patient record is the authoritative entity of the system. Billing
//! accounts and downstream projections are derived from it and kept
//! consistent via the billing client and lifecycle events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ServiceError;

/// Opaque unique patient identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(Uuid);

impl PatientId {
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

    /// Parse from a string representation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] if the string is not a UUID.
    pub fn parse(s: &str) -> Result<Self, ServiceError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ServiceError::Validation {
                field: "patient_id",
                message: format!("not a valid id: {e}"),
            })
    }
}

impl Default for PatientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The authoritative patient record.
///
/// Email is globally unique. Uniqueness is pre-checked at write time but
/// the persistence layer's unique constraint remains the authority; the
/// pre-check alone is not sufficient under concurrent creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Unique identifier.
    pub id: PatientId,
    /// Full name.
    pub name: String,
    /// Globally unique email address.
    pub email: String,
    /// Postal address.
    pub address: String,
    /// Date of birth (calendar date, no time component).
    pub date_of_birth: NaiveDate,
    /// When the patient was registered.
    pub registered_at: DateTime<Utc>,
}

impl Patient {
    /// Materialize a new patient from a validated draft.
    #[must_use]
    pub fn from_draft(draft: PatientDraft, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: PatientId::new(),
            name: draft.name,
            email: draft.email,
            address: draft.address,
            date_of_birth: draft.date_of_birth,
            registered_at,
        }
    }

    /// Apply the mutable fields of a draft to an existing record.
    ///
    /// Identity and registration time are immutable.
    #[must_use]
    pub fn with_draft(mut self, draft: PatientDraft) -> Self {
        self.name = draft.name;
        self.email = draft.email;
        self.address = draft.address;
        self.date_of_birth = draft.date_of_birth;
        self
    }
}

/// Validated input for creating or updating a patient.
///
/// Construct via [`PatientDraft::new`], which enforces field-level
/// validation and reports the offending field on failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientDraft {
    /// Full name, non-empty.
    pub name: String,
    /// Email address, non-empty and minimally well-formed.
    pub email: String,
    /// Postal address, non-empty.
    pub address: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
}

impl PatientDraft {
    /// Validate raw input into a draft.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] naming the first offending
    /// field. The email check is a shape check only; uniqueness is
    /// enforced at write time.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        address: impl Into<String>,
        date_of_birth: NaiveDate,
    ) -> Result<Self, ServiceError> {
        let name = name.into();
        let email = email.into();
        let address = address.into();

        if name.trim().is_empty() {
            return Err(ServiceError::Validation {
                field: "name",
                message: "name is required".to_string(),
            });
        }
        if !is_plausible_email(&email) {
            return Err(ServiceError::Validation {
                field: "email",
                message: format!("'{email}' is not a valid email address"),
            });
        }
        if address.trim().is_empty() {
            return Err(ServiceError::Validation {
                field: "address",
                message: "address is required".to_string(),
            });
        }

        Ok(Self {
            name,
            email,
            address,
            date_of_birth,
        })
    }
}

/// Minimal email shape check: one `@` with non-empty local part and a
/// domain containing a dot.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 4, 12).unwrap()
    }

    #[test]
    fn draft_accepts_valid_input() {
        let draft = PatientDraft::new("Jane Doe", "jane@example.com", "1 Main St", dob());
        assert!(draft.is_ok());
    }

    #[test]
    fn draft_rejects_empty_name() {
        let err = PatientDraft::new("  ", "jane@example.com", "1 Main St", dob()).unwrap_err();
        match err {
            ServiceError::Validation { field, .. } => assert_eq!(field, "name"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn draft_rejects_malformed_email() {
        for email in ["", "jane", "jane@", "@example.com", "jane@nodot"] {
            let result = PatientDraft::new("Jane", email, "1 Main St", dob());
            assert!(result.is_err(), "email '{email}' should be rejected");
        }
    }

    #[test]
    fn with_draft_preserves_identity() {
        let draft = PatientDraft::new("Jane", "jane@example.com", "1 Main St", dob()).unwrap();
        let patient = Patient::from_draft(draft, Utc::now());
        let id = patient.id;
        let registered_at = patient.registered_at;

        let updated = patient.with_draft(
            PatientDraft::new("Jane Smith", "jane.smith@example.com", "2 Oak Ave", dob()).unwrap(),
        );

        assert_eq!(updated.id, id);
        assert_eq!(updated.registered_at, registered_at);
        assert_eq!(updated.name, "Jane Smith");
    }

    #[test]
    fn patient_id_roundtrips_through_string() {
        let id = PatientId::new();
        let parsed = PatientId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
