//! # Patientcare Core
//!
//! Core domain types and trait seams for the patientcare services.
//!
//! This crate defines WHAT the system talks about; sibling crates provide
//! the infrastructure HOW:
//!
//! - **Domain**: [`patient::Patient`], [`appointment::Appointment`],
//!   [`projection::PatientProjection`], [`billing::ProvisionedAccount`]
//! - **Events**: typed lifecycle envelopes published on the event bus with
//!   at-least-once delivery, partitioned by patient id
//! - **Seams**: [`event_bus::EventBus`], [`store::PatientStore`],
//!   [`store::AppointmentStore`], [`cache::Cache`],
//!   [`projection::PatientProjectionStore`], [`billing::BillingClient`]
//! - **Errors**: the [`error::ServiceError`] taxonomy surfaced to callers
//!
//! ## Consistency model
//!
//! The patient record is authoritative. The billing account and the cached
//! patient projection are derived, eventually-consistent copies kept fresh
//! by events. Write ordering is always: persistence commit, then cache
//! eviction, then external RPC/publish. There is no distributed
//! transaction; consumers must be idempotent.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub mod appointment;
pub mod billing;
pub mod cache;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod patient;
pub mod projection;
pub mod store;

pub use appointment::{Appointment, AppointmentId};
pub use billing::{
    BillingAccountStatus, BillingClient, BillingError, BillingRequest, BillingResponse,
    BillingTransport, ProvisionedAccount,
};
pub use cache::{Cache, CacheError};
pub use environment::{Clock, SystemClock};
pub use error::{Result, ServiceError};
pub use event::{BillingAccountEvent, Event, PatientEvent, PatientEventKind, SerializedEvent};
pub use event_bus::{EventBus, EventBusError, EventStream};
pub use patient::{Patient, PatientDraft, PatientId};
pub use projection::{PatientProjection, PatientProjectionStore, ProjectionError};
pub use store::{
    Page, PageRequest, PatientStore, SearchField, SearchFilter, SortDir, StoreError,
};
