//! Typed lifecycle events and the opaque wire envelope.
//!
//! Events are immutable facts published after a patient write commits.
//! They are serialized with `bincode` into a [`SerializedEvent`] envelope
//! and partitioned by patient id, so delivery is in order per patient and
//! at-least-once overall. Consumers must converge under replay.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::patient::{Patient, PatientId};

/// Topic names used by the patientcare services.
pub mod topics {
    /// Patient created lifecycle events.
    pub const PATIENT_CREATED: &str = "patient.created";
    /// Patient updated lifecycle events.
    pub const PATIENT_UPDATED: &str = "patient.updated";
    /// Deferred billing-account provisioning requests.
    pub const BILLING_ACCOUNT: &str = "billing-account";
}

/// Error types for event encode/decode.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event to bytes.
    #[error("failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event from bytes.
    #[error("failed to deserialize event: {0}")]
    Deserialization(String),
}

/// An event that can be published on the event bus.
///
/// The `event_type()` string is carried in the envelope and used by
/// consumers to route the payload to the right decoder.
pub trait Event: Send + Sync + 'static {
    /// Stable event type tag (e.g. `"PATIENT_CREATED"`).
    fn event_type(&self) -> &'static str;

    /// Partition key for ordering. Events with the same key are delivered
    /// in order; across keys there is no ordering guarantee.
    fn partition_key(&self) -> String;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if encoding fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the bytes do not decode
    /// to this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

/// The opaque typed envelope carried on the wire.
///
/// Holds the event type tag, the bincode payload, and the partition key.
/// The payload encoding is deliberately not interpreted by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Event type tag (e.g. `"PATIENT_CREATED"`).
    pub event_type: String,
    /// Bincode-serialized event payload.
    pub data: Vec<u8>,
    /// Partition key; the patient id for all patientcare events.
    pub key: String,
}

impl SerializedEvent {
    /// Create an envelope from raw parts.
    #[must_use]
    pub const fn new(event_type: String, data: Vec<u8>, key: String) -> Self {
        Self {
            event_type,
            data,
            key,
        }
    }

    /// Build an envelope from a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload fails to
    /// encode.
    pub fn from_event<E: Event + Serialize>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            key: event.partition_key(),
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.key,
            self.data.len()
        )
    }
}

/// Kind tag of a patient lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientEventKind {
    /// A new patient record was created.
    Created,
    /// An existing patient record was mutated.
    Updated,
}

impl PatientEventKind {
    /// Topic this kind of event is published on.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Created => topics::PATIENT_CREATED,
            Self::Updated => topics::PATIENT_UPDATED,
        }
    }
}

/// Patient lifecycle event as carried to downstream projections.
///
/// Carries just enough of the record for consumers to resolve a patient's
/// display name without a live RPC.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientEvent {
    /// The patient this event describes.
    pub patient_id: PatientId,
    /// Patient name at emission time.
    pub name: String,
    /// Patient email at emission time.
    pub email: String,
    /// Created or updated.
    pub kind: PatientEventKind,
    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
}

impl PatientEvent {
    /// Build a lifecycle event from the committed patient record.
    #[must_use]
    pub fn from_patient(patient: &Patient, kind: PatientEventKind, now: DateTime<Utc>) -> Self {
        Self {
            patient_id: patient.id,
            name: patient.name.clone(),
            email: patient.email.clone(),
            kind,
            emitted_at: now,
        }
    }
}

impl Event for PatientEvent {
    fn event_type(&self) -> &'static str {
        match self.kind {
            PatientEventKind::Created => "PATIENT_CREATED",
            PatientEventKind::Updated => "PATIENT_UPDATED",
        }
    }

    fn partition_key(&self) -> String {
        self.patient_id.to_string()
    }
}

/// Deferred billing provisioning request, published when the billing
/// service is unavailable during patient creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAccountEvent {
    /// The patient awaiting a billing account.
    pub patient_id: PatientId,
    /// Patient name for the account.
    pub name: String,
    /// Patient email for the account.
    pub email: String,
    /// When the request was deferred.
    pub emitted_at: DateTime<Utc>,
}

impl Event for BillingAccountEvent {
    fn event_type(&self) -> &'static str {
        "BILLING_ACCOUNT_CREATE_REQUESTED"
    }

    fn partition_key(&self) -> String {
        self.patient_id.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_event(kind: PatientEventKind) -> PatientEvent {
        PatientEvent {
            patient_id: PatientId::new(),
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            kind,
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn patient_event_type_tags() {
        assert_eq!(
            sample_event(PatientEventKind::Created).event_type(),
            "PATIENT_CREATED"
        );
        assert_eq!(
            sample_event(PatientEventKind::Updated).event_type(),
            "PATIENT_UPDATED"
        );
    }

    #[test]
    fn partition_key_is_patient_id() {
        let event = sample_event(PatientEventKind::Created);
        assert_eq!(event.partition_key(), event.patient_id.to_string());
    }

    #[test]
    fn envelope_roundtrip() {
        let event = sample_event(PatientEventKind::Updated);
        let envelope = SerializedEvent::from_event(&event).unwrap();
        assert_eq!(envelope.event_type, "PATIENT_UPDATED");

        let decoded = PatientEvent::from_bytes(&envelope.data).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(PatientEvent::from_bytes(&[0xff, 0x01, 0x02]).is_err());
    }
}
