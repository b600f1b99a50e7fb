//! Scripted billing doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock poisoning

use patientcare_core::billing::{
    BillingClient, BillingError, BillingRequest, BillingResponse, BillingTransport,
    ProvisionedAccount,
};
use patientcare_core::patient::PatientId;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Scripted [`BillingClient`] with call capture.
///
/// Responses are consumed front-to-back; when the script is exhausted,
/// calls succeed with an active account. Use this when a test only cares
/// about the command service's reaction, not the fallback machinery (the
/// real client in `patientcare-billing` covers that).
#[derive(Clone, Default)]
pub struct StubBillingClient {
    script: Arc<Mutex<VecDeque<Result<ProvisionedAccount, BillingError>>>>,
    calls: Arc<Mutex<Vec<BillingRequest>>>,
}

impl StubBillingClient {
    /// Create a stub that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn push_response(&self, response: Result<ProvisionedAccount, BillingError>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Requests observed so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn calls(&self) -> Vec<BillingRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl BillingClient for StubBillingClient {
    fn provision_account(
        &self,
        patient_id: PatientId,
        name: &str,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ProvisionedAccount, BillingError>> + Send + '_>> {
        let request = BillingRequest {
            patient_id,
            name: name.to_string(),
            email: email.to_string(),
        };
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            self.calls.lock().unwrap().push(request);
            #[allow(clippy::unwrap_used)]
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(ProvisionedAccount {
                    account_id: format!("acct-{patient_id}"),
                    status: patientcare_core::billing::BillingAccountStatus::Active,
                })
            })
        })
    }
}

/// Scripted [`BillingTransport`] for exercising the real provisioning
/// client's status mapping and fallback behavior.
#[derive(Clone, Default)]
pub struct MockBillingTransport {
    script: Arc<Mutex<VecDeque<Result<BillingResponse, BillingError>>>>,
    calls: Arc<Mutex<Vec<BillingRequest>>>,
}

impl MockBillingTransport {
    /// Create a transport that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next transport outcome.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn push_response(&self, response: Result<BillingResponse, BillingError>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Requests observed so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn calls(&self) -> Vec<BillingRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl BillingTransport for MockBillingTransport {
    fn create_billing_account(
        &self,
        request: BillingRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BillingResponse, BillingError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            self.calls.lock().unwrap().push(request.clone());
            #[allow(clippy::unwrap_used)]
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(BillingResponse {
                    account_id: format!("acct-{}", request.patient_id),
                    status: "ACTIVE".to_string(),
                })
            })
        })
    }
}
