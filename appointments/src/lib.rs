//! Appointment service: cached patient projection plus optimistic
//! concurrency on appointment updates.
//!
//! The projection updater keeps a local, non-authoritative copy of
//! patient display data, fed by `patient.created` / `patient.updated`
//! events. Appointment listings resolve patient names from that copy
//! and never fail when it is cold.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod service;
mod updater;

pub use service::AppointmentService;
pub use updater::{DeadLetterSink, ProjectionUpdater, CONSUMER_GROUP};
