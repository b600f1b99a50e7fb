//! Billing provisioning contract.
//!
//! The billing account is owned by the billing service; this side only
//! issues a create request and reads back the account id and status. All
//! failure categories are typed from the transport status code, never
//! from string matching on messages.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::patient::PatientId;

/// Lifecycle status of a billing account as reported by the billing
/// service.
///
/// `Pending` is synthetic: it is returned locally when billing is
/// unavailable and account creation was deferred to the event channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingAccountStatus {
    /// Account is active.
    Active,
    /// Account exists but is inactive.
    Inactive,
    /// Account is suspended.
    Suspended,
    /// Account creation was deferred; no account exists yet.
    Pending,
}

impl BillingAccountStatus {
    /// Parse the wire representation used by the billing service.
    ///
    /// Unknown strings map to `Pending` rather than failing: the caller
    /// of patient-create must never fail on a cosmetic status mismatch.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Pending,
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Pending => "PENDING",
        }
    }
}

/// Outcome of a billing provisioning call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedAccount {
    /// Billing-side account identifier. Empty when `status` is
    /// [`BillingAccountStatus::Pending`].
    pub account_id: String,
    /// Account status reported by billing.
    pub status: BillingAccountStatus,
}

impl ProvisionedAccount {
    /// The synthetic outcome returned when billing is unavailable and
    /// provisioning was deferred to the event channel.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            account_id: String::new(),
            status: BillingAccountStatus::Pending,
        }
    }

    /// Whether provisioning was deferred rather than completed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == BillingAccountStatus::Pending
    }
}

/// Typed billing failures, each derived 1:1 from the transport status
/// code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BillingError {
    /// A billing account already exists for this patient.
    #[error("billing account already exists for patient {patient_id}")]
    AccountExists {
        /// The patient that already has an account.
        patient_id: PatientId,
    },

    /// The billing service rejected the request data.
    #[error("invalid billing information: {0}")]
    InvalidArgument(String),

    /// The request exceeded its deadline.
    #[error("billing service request timed out")]
    Timeout,

    /// The billing service is unreachable. This is the only variant that
    /// triggers the deferred-provisioning fallback.
    #[error("billing service is currently unavailable")]
    Unavailable,

    /// Authentication with the billing service failed.
    #[error("authentication failed with billing service")]
    AuthFailed,

    /// Any other failure.
    #[error("unexpected billing error: {0}")]
    Unknown(String),
}

/// A billing provisioning request as carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingRequest {
    /// The patient to open an account for.
    pub patient_id: PatientId,
    /// Patient name.
    pub name: String,
    /// Patient email.
    pub email: String,
}

/// Raw billing provisioning response before status parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingResponse {
    /// Billing-side account identifier.
    pub account_id: String,
    /// Wire status string (e.g. `"ACTIVE"`).
    pub status: String,
}

impl BillingResponse {
    /// Parse into the typed outcome.
    #[must_use]
    pub fn into_account(self) -> ProvisionedAccount {
        ProvisionedAccount {
            status: BillingAccountStatus::parse(&self.status),
            account_id: self.account_id,
        }
    }
}

/// The synchronous request/response channel to the billing service.
///
/// Implementations map their transport's status codes 1:1 onto
/// [`BillingError`] variants; they never classify by message text. The
/// production implementation is the tonic client in
/// `patientcare-billing`.
pub trait BillingTransport: Send + Sync {
    /// Issue a create-account request.
    ///
    /// # Errors
    ///
    /// Returns the [`BillingError`] derived from the transport status
    /// code.
    fn create_billing_account(
        &self,
        request: BillingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BillingResponse, BillingError>> + Send + '_>>;
}

/// Client-side contract for provisioning billing accounts.
///
/// Implementations absorb [`BillingError::Unavailable`] into the deferred
/// path (publish a billing-account-requested event, return
/// [`ProvisionedAccount::pending`]); every other typed error propagates.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the client can be held
/// as `Arc<dyn BillingClient>` by the command service.
pub trait BillingClient: Send + Sync {
    /// Request creation of a billing account for a freshly persisted
    /// patient.
    ///
    /// # Errors
    ///
    /// Returns any [`BillingError`] except `Unavailable`, which the
    /// implementation absorbs into a pending outcome.
    fn provision_account(
        &self,
        patient_id: PatientId,
        name: &str,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ProvisionedAccount, BillingError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            BillingAccountStatus::Active,
            BillingAccountStatus::Inactive,
            BillingAccountStatus::Suspended,
            BillingAccountStatus::Pending,
        ] {
            assert_eq!(BillingAccountStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_maps_to_pending() {
        assert_eq!(
            BillingAccountStatus::parse("FROZEN"),
            BillingAccountStatus::Pending
        );
    }

    #[test]
    fn pending_outcome_has_empty_account_id() {
        let outcome = ProvisionedAccount::pending();
        assert!(outcome.account_id.is_empty());
        assert!(outcome.is_pending());
    }
}
