//! Provisioning client with the deferred-billing fallback.

use patientcare_core::billing::{
    BillingClient, BillingError, BillingRequest, BillingTransport, ProvisionedAccount,
};
use patientcare_core::environment::Clock;
use patientcare_core::event::{topics, BillingAccountEvent, SerializedEvent};
use patientcare_core::event_bus::EventBus;
use patientcare_core::patient::PatientId;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Production [`BillingClient`].
///
/// Absorbs exactly one failure category: [`BillingError::Unavailable`]
/// becomes a `BILLING_ACCOUNT_CREATE_REQUESTED` event on the
/// `billing-account` topic plus a pending outcome. Every other typed
/// error propagates to the caller, who decides whether the surrounding
/// operation fails.
///
/// Supports graceful shutdown: [`shutdown`](Self::shutdown) stops
/// accepting new calls, waits for in-flight provisioning to drain, and
/// force-fails anything still outstanding when the grace window elapses.
pub struct BillingProvisioningClient {
    transport: Arc<dyn BillingTransport>,
    event_bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicUsize,
    drained: Notify,
    closed: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl BillingProvisioningClient {
    /// Create a client with the system clock.
    #[must_use]
    pub fn new(transport: Arc<dyn BillingTransport>, event_bus: Arc<dyn EventBus>) -> Self {
        Self::with_clock(
            transport,
            event_bus,
            Arc::new(patientcare_core::environment::SystemClock),
        )
    }

    /// Create a client with an explicit clock.
    #[must_use]
    pub fn with_clock(
        transport: Arc<dyn BillingTransport>,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            event_bus,
            clock,
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            closed: AtomicBool::new(false),
            cancel: watch::channel(false).0,
        }
    }

    /// Number of provisioning calls currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting new calls and wait up to `grace` for in-flight
    /// provisioning to finish.
    ///
    /// Returns `true` if everything drained; `false` if the grace period
    /// elapsed with calls still outstanding. Outstanding calls are
    /// cancelled and fail with [`BillingError::Unavailable`], as do any
    /// new calls after shutdown.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);

        let drain = async {
            loop {
                // Register for the wakeup before checking the counter, so
                // a decrement landing in between is not lost.
                let notified = self.drained.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(grace, drain).await {
            Ok(()) => {
                tracing::info!("billing client shut down cleanly");
                true
            }
            Err(_) => {
                tracing::warn!(
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    "billing client shutdown grace period elapsed, cancelling outstanding calls"
                );
                self.cancel.send_replace(true);
                false
            }
        }
    }

    /// Publish the deferred provisioning request.
    async fn defer(
        &self,
        patient_id: PatientId,
        name: &str,
        email: &str,
    ) -> Result<ProvisionedAccount, BillingError> {
        let event = BillingAccountEvent {
            patient_id,
            name: name.to_string(),
            email: email.to_string(),
            emitted_at: self.clock.now(),
        };
        let envelope = SerializedEvent::from_event(&event)
            .map_err(|e| BillingError::Unknown(format!("failed to encode deferred event: {e}")))?;

        match self.event_bus.publish(topics::BILLING_ACCOUNT, &envelope).await {
            Ok(()) => {
                tracing::warn!(
                    patient_id = %patient_id,
                    topic = topics::BILLING_ACCOUNT,
                    "billing unavailable, provisioning deferred to event channel"
                );
                Ok(ProvisionedAccount::pending())
            }
            Err(e) => {
                // Both the RPC and the fallback channel failed; nothing
                // left to absorb the outage into.
                tracing::error!(
                    patient_id = %patient_id,
                    error = %e,
                    "failed to publish deferred billing request"
                );
                Err(BillingError::Unavailable)
            }
        }
    }
}

/// Decrements the in-flight counter when a call completes, including on
/// early returns.
struct InFlightGuard<'a> {
    client: &'a BillingProvisioningClient,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.client.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.client.drained.notify_waiters();
        }
    }
}

impl BillingClient for BillingProvisioningClient {
    fn provision_account(
        &self,
        patient_id: PatientId,
        name: &str,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ProvisionedAccount, BillingError>> + Send + '_>> {
        let name = name.to_string();
        let email = email.to_string();

        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BillingError::Unavailable);
            }
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let _guard = InFlightGuard { client: self };

            let request = BillingRequest {
                patient_id,
                name: name.clone(),
                email: email.clone(),
            };

            let mut cancelled = self.cancel.subscribe();
            let outcome = tokio::select! {
                result = self.transport.create_billing_account(request) => result,
                _ = cancelled.wait_for(|cancel| *cancel) => {
                    tracing::warn!(
                        patient_id = %patient_id,
                        "billing call cancelled by shutdown"
                    );
                    return Err(BillingError::Unavailable);
                }
            };

            match outcome {
                Ok(response) => {
                    let account = response.into_account();
                    tracing::info!(
                        patient_id = %patient_id,
                        account_id = %account.account_id,
                        status = account.status.as_str(),
                        "billing account provisioned"
                    );
                    Ok(account)
                }
                Err(BillingError::Unavailable) => self.defer(patient_id, &name, &email).await,
                Err(e) => {
                    tracing::warn!(patient_id = %patient_id, error = %e, "billing provisioning failed");
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use patientcare_core::billing::{BillingAccountStatus, BillingResponse};
    use patientcare_core::event::Event;
    use patientcare_testing::{test_clock, InMemoryEventBus, MockBillingTransport};

    fn client_with(
        transport: MockBillingTransport,
    ) -> (BillingProvisioningClient, Arc<InMemoryEventBus>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let client = BillingProvisioningClient::with_clock(
            Arc::new(transport),
            bus.clone(),
            Arc::new(test_clock()),
        );
        (client, bus)
    }

    #[tokio::test]
    async fn successful_provisioning_returns_active_account() {
        let transport = MockBillingTransport::new();
        transport.push_response(Ok(BillingResponse {
            account_id: "acct-42".to_string(),
            status: "ACTIVE".to_string(),
        }));
        let (client, bus) = client_with(transport);

        let account = client
            .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
            .await
            .unwrap();

        assert_eq!(account.account_id, "acct-42");
        assert_eq!(account.status, BillingAccountStatus::Active);
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_defers_to_event_channel() {
        let transport = MockBillingTransport::new();
        transport.push_response(Err(BillingError::Unavailable));
        let (client, bus) = client_with(transport);

        let patient_id = PatientId::new();
        let account = client
            .provision_account(patient_id, "Jane Doe", "jane@example.com")
            .await
            .unwrap();

        assert!(account.is_pending());
        let published = bus.published(topics::BILLING_ACCOUNT);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, "BILLING_ACCOUNT_CREATE_REQUESTED");
        assert_eq!(published[0].key, patient_id.to_string());

        let event = BillingAccountEvent::from_bytes(&published[0].data).unwrap();
        assert_eq!(event.patient_id, patient_id);
        assert_eq!(event.email, "jane@example.com");
    }

    #[tokio::test]
    async fn other_errors_propagate_without_publishing() {
        let transport = MockBillingTransport::new();
        transport.push_response(Err(BillingError::InvalidArgument("bad email".to_string())));
        let (client, bus) = client_with(transport);

        let result = client
            .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
            .await;

        assert!(matches!(result, Err(BillingError::InvalidArgument(_))));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn account_exists_propagates() {
        let patient_id = PatientId::new();
        let transport = MockBillingTransport::new();
        transport.push_response(Err(BillingError::AccountExists { patient_id }));
        let (client, bus) = client_with(transport);

        let result = client
            .provision_account(patient_id, "Jane Doe", "jane@example.com")
            .await;

        assert_eq!(result, Err(BillingError::AccountExists { patient_id }));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn failed_fallback_publish_surfaces_unavailable() {
        let transport = MockBillingTransport::new();
        transport.push_response(Err(BillingError::Unavailable));
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_publishes(
            topics::BILLING_ACCOUNT,
            patientcare_core::event_bus::EventBusError::PublishFailed {
                topic: topics::BILLING_ACCOUNT.to_string(),
                reason: "broker down".to_string(),
            },
        );
        let client = BillingProvisioningClient::with_clock(
            Arc::new(transport),
            bus,
            Arc::new(test_clock()),
        );

        let result = client
            .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
            .await;

        assert_eq!(result, Err(BillingError::Unavailable));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_calls() {
        let (client, _bus) = client_with(MockBillingTransport::new());

        assert!(client.shutdown(Duration::from_millis(10)).await);
        let result = client
            .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
            .await;
        assert_eq!(result, Err(BillingError::Unavailable));
    }

    #[tokio::test]
    async fn shutdown_with_nothing_in_flight_drains_immediately() {
        let transport = MockBillingTransport::new();
        transport.push_response(Ok(BillingResponse {
            account_id: "acct-1".to_string(),
            status: "ACTIVE".to_string(),
        }));
        let (client, _bus) = client_with(transport);

        client
            .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
            .await
            .unwrap();

        assert_eq!(client.in_flight(), 0);
        assert!(client.shutdown(Duration::from_millis(10)).await);
    }

    /// Transport that answers successfully, but only after a fixed delay.
    struct SlowTransport {
        delay: Duration,
    }

    impl BillingTransport for SlowTransport {
        fn create_billing_account(
            &self,
            request: BillingRequest,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<BillingResponse, BillingError>> + Send + '_>,
        > {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(BillingResponse {
                    account_id: format!("acct-{}", request.patient_id),
                    status: "ACTIVE".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn shutdown_grace_elapsed_fails_outstanding_calls() {
        let bus = Arc::new(InMemoryEventBus::new());
        let client = Arc::new(BillingProvisioningClient::with_clock(
            Arc::new(SlowTransport {
                delay: Duration::from_millis(300),
            }),
            bus,
            Arc::new(test_clock()),
        ));

        let caller = client.clone();
        let pending = tokio::spawn(async move {
            caller
                .provision_account(PatientId::new(), "Jane Doe", "jane@example.com")
                .await
        });

        // Wait for the call to actually be in flight before shutting down.
        for _ in 0..1000 {
            if client.in_flight() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(client.in_flight(), 1);

        assert!(!client.shutdown(Duration::from_millis(50)).await);

        let outcome = pending.await.unwrap();
        assert_eq!(outcome, Err(BillingError::Unavailable));
        assert_eq!(client.in_flight(), 0);
    }
}
