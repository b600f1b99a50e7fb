//! gRPC billing provisioning client.
//!
//! Implements [`patientcare_core::billing::BillingClient`] over a tonic
//! channel to the billing service, with the deferred-provisioning
//! fallback: when billing is unreachable, a
//! `BILLING_ACCOUNT_CREATE_REQUESTED` event is published instead and the
//! caller gets a pending outcome, so patient creation never fails on a
//! billing outage alone.
//!
//! # Example
//!
//! ```ignore
//! use patientcare_billing::{BillingConfig, BillingProvisioningClient, GrpcBillingTransport};
//! use std::sync::Arc;
//!
//! async fn example(bus: Arc<dyn patientcare_core::event_bus::EventBus>) {
//!     let config = BillingConfig::new("http://billing:9001");
//!     let transport = GrpcBillingTransport::new(&config).unwrap();
//!     let client = BillingProvisioningClient::new(Arc::new(transport), bus);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod pb;
mod transport;

pub use client::BillingProvisioningClient;
pub use transport::{BillingConfig, GrpcBillingTransport};
