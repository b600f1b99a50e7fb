//! Patient command service.
//!
//! Owns the authoritative patient write path and the cached query path.
//! The write path orders its side effects strictly: persistence commit,
//! then cache eviction, then billing RPC, then lifecycle publish. A
//! crash after commit but before the RPC/publish leaves a patient with
//! no billing account and no pending event; that gap is accepted and
//! documented rather than closed with an outbox.
//!
//! # Example
//!
//! ```ignore
//! use patientcare_patient::{PatientCommandService, PatientServiceConfig};
//!
//! let service = PatientCommandService::new(store, cache, billing, event_bus);
//! let created = service.create_patient(draft).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod keys;
mod service;

pub use config::PatientServiceConfig;
pub use keys::{listing_key, patient_key};
pub use service::{CreatedPatient, PatientCommandService};
