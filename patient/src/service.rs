//! The patient command service.

use patientcare_core::billing::{BillingClient, ProvisionedAccount};
use patientcare_core::cache::{get_typed, put_typed, Cache, LISTING_PREFIX};
use patientcare_core::environment::{Clock, SystemClock};
use patientcare_core::error::{Result, ServiceError};
use patientcare_core::event::{PatientEvent, PatientEventKind, SerializedEvent};
use patientcare_core::event_bus::EventBus;
use patientcare_core::patient::{Patient, PatientDraft, PatientId};
use patientcare_core::store::{Page, PageRequest, PatientStore, SearchField, SearchFilter};
use std::sync::Arc;

use crate::config::PatientServiceConfig;
use crate::keys::{listing_key, patient_key};

/// Outcome of a successful patient creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedPatient {
    /// The persisted patient record.
    pub patient: Patient,
    /// The billing provisioning outcome. `Pending` when billing was
    /// unavailable and provisioning was deferred.
    pub billing: ProvisionedAccount,
}

/// Authoritative write path and cached query path for patients.
///
/// Side effects are strictly ordered: persistence commit happens before
/// cache eviction happens before the billing RPC and lifecycle publish.
/// Cache failures degrade to misses and never fail a request.
pub struct PatientCommandService<S> {
    store: S,
    cache: Arc<dyn Cache>,
    billing: Arc<dyn BillingClient>,
    event_bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: PatientServiceConfig,
}

impl<S: PatientStore> PatientCommandService<S> {
    /// Create a service with the system clock and default config.
    #[must_use]
    pub fn new(
        store: S,
        cache: Arc<dyn Cache>,
        billing: Arc<dyn BillingClient>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            store,
            cache,
            billing,
            event_bus,
            clock: Arc::new(SystemClock),
            config: PatientServiceConfig::new(),
        }
    }

    /// Override the clock (tests use a fixed one).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the config.
    #[must_use]
    pub fn with_config(mut self, config: PatientServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a patient and provision its billing account.
    ///
    /// The billing RPC runs only after the patient row is committed. A
    /// billing outage is absorbed: the outcome comes back `Pending` and
    /// provisioning completes asynchronously. Any other billing failure
    /// propagates, but the patient record remains; patient existence is
    /// authoritative even when provisioning is incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Conflict`] if the email is taken, or
    /// [`ServiceError::Upstream`] on a non-unavailable billing failure.
    pub async fn create_patient(&self, draft: PatientDraft) -> Result<CreatedPatient> {
        // Advisory pre-check; the unique constraint remains the
        // authority under concurrent creates.
        if self.store.email_exists(&draft.email, None).await? {
            return Err(ServiceError::Conflict(format!(
                "a patient with email '{}' already exists",
                draft.email
            )));
        }

        let patient = Patient::from_draft(draft, self.clock.now());
        self.store.insert(&patient).await?;
        tracing::info!(patient_id = %patient.id, "patient created");

        self.evict_listings().await;

        let billing = self
            .billing
            .provision_account(patient.id, &patient.name, &patient.email)
            .await?;

        self.publish_lifecycle(&patient, PatientEventKind::Created)
            .await;

        Ok(CreatedPatient { patient, billing })
    }

    /// Update a patient's mutable fields.
    ///
    /// Evicts the listing namespace and write-throughs the by-id cache
    /// entry with the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the id is absent, or
    /// [`ServiceError::Conflict`] if the new email belongs to another
    /// patient.
    pub async fn update_patient(&self, id: PatientId, draft: PatientDraft) -> Result<Patient> {
        let existing = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "patient",
                id: id.to_string(),
            })?;

        if self.store.email_exists(&draft.email, Some(id)).await? {
            return Err(ServiceError::Conflict(format!(
                "a patient with email '{}' already exists",
                draft.email
            )));
        }

        let updated = existing.with_draft(draft);
        self.store.update(&updated).await?;
        tracing::info!(patient_id = %id, "patient updated");

        self.evict_listings().await;
        if let Err(e) = put_typed(
            self.cache.as_ref(),
            &patient_key(id),
            &updated,
            Some(self.config.cache_ttl),
        )
        .await
        {
            tracing::warn!(patient_id = %id, error = %e, "failed to refresh by-id cache entry");
        }

        self.publish_lifecycle(&updated, PatientEventKind::Updated)
            .await;

        Ok(updated)
    }

    /// Delete a patient.
    ///
    /// Evicts the by-id entry and the whole listing namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the id is absent.
    pub async fn delete_patient(&self, id: PatientId) -> Result<()> {
        self.store.delete(id).await?;
        tracing::info!(patient_id = %id, "patient deleted");

        if let Err(e) = self.cache.invalidate(&patient_key(id)).await {
            tracing::warn!(patient_id = %id, error = %e, "failed to evict by-id cache entry");
        }
        self.evict_listings().await;

        Ok(())
    }

    /// Paginated, optionally filtered patient listing.
    ///
    /// Unfiltered listings are served from the cache when possible.
    /// Filtered listings always hit the store. An unrecognized
    /// `search_field` yields an empty page rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] if the store query fails.
    pub async fn get_patients(
        &self,
        request: &PageRequest,
        search_field: Option<&str>,
        search_value: Option<&str>,
    ) -> Result<Page<Patient>> {
        // A filter is active only when both field and value are present
        // and the value is non-empty.
        if let (Some(field), Some(value)) = (search_field, search_value) {
            if !value.trim().is_empty() {
                let Some(field) = SearchField::parse(field) else {
                    tracing::debug!(search_field = field, "unrecognized search field");
                    return Ok(Page::empty(request));
                };
                let filter = SearchFilter {
                    field,
                    value: value.to_string(),
                };
                return Ok(self.store.list(request, Some(&filter)).await?);
            }
        }

        let key = listing_key(request);
        match get_typed::<Page<Patient>>(self.cache.as_ref(), &key).await {
            Ok(Some(page)) => {
                metrics::counter!("patientcare.cache.hit", "cache" => "listing").increment(1);
                tracing::debug!(key = %key, "listing served from cache");
                return Ok(page);
            }
            Ok(None) => {
                metrics::counter!("patientcare.cache.miss", "cache" => "listing").increment(1);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "listing cache read failed, treating as miss");
            }
        }

        let page = self.store.list(request, None).await?;
        if let Err(e) = put_typed(
            self.cache.as_ref(),
            &key,
            &page,
            Some(self.config.cache_ttl),
        )
        .await
        {
            tracing::warn!(key = %key, error = %e, "failed to cache listing page");
        }

        Ok(page)
    }

    /// Look up a single patient by id, via the by-id cache.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the id is absent.
    pub async fn get_patient_by_id(&self, id: PatientId) -> Result<Patient> {
        let key = patient_key(id);
        match get_typed::<Patient>(self.cache.as_ref(), &key).await {
            Ok(Some(patient)) => {
                metrics::counter!("patientcare.cache.hit", "cache" => "patient").increment(1);
                return Ok(patient);
            }
            Ok(None) => {
                metrics::counter!("patientcare.cache.miss", "cache" => "patient").increment(1);
            }
            Err(e) => {
                tracing::warn!(patient_id = %id, error = %e, "by-id cache read failed, treating as miss");
            }
        }

        let patient = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "patient",
                id: id.to_string(),
            })?;

        if let Err(e) = put_typed(
            self.cache.as_ref(),
            &key,
            &patient,
            Some(self.config.cache_ttl),
        )
        .await
        {
            tracing::warn!(patient_id = %id, error = %e, "failed to cache patient");
        }

        Ok(patient)
    }

    /// Evict every cached listing page. Any patient mutation
    /// invalidates all pages: a page's membership is not derivable
    /// from a single record change.
    async fn evict_listings(&self) {
        if let Err(e) = self.cache.invalidate_prefix(LISTING_PREFIX).await {
            tracing::warn!(error = %e, "failed to evict listing cache");
        }
    }

    /// Publish a lifecycle event for a committed write. Publish failures
    /// are logged, not surfaced: the write already committed and the
    /// caller's outcome must not depend on the bus.
    async fn publish_lifecycle(&self, patient: &Patient, kind: PatientEventKind) {
        let event = PatientEvent::from_patient(patient, kind, self.clock.now());
        let envelope = match SerializedEvent::from_event(&event) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(patient_id = %patient.id, error = %e, "failed to encode lifecycle event");
                return;
            }
        };

        if let Err(e) = self.event_bus.publish(kind.topic(), &envelope).await {
            tracing::error!(
                patient_id = %patient.id,
                topic = kind.topic(),
                error = %e,
                "failed to publish lifecycle event"
            );
        }
    }
}
