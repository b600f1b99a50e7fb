//! # Patientcare Testing
//!
//! In-memory test doubles for the patientcare services:
//!
//! - [`InMemoryEventBus`]: synchronous pub/sub with published-event
//!   inspection and at-least-once redelivery helpers
//! - [`InMemoryPatientStore`] / [`InMemoryAppointmentStore`]: `HashMap`
//!   stores enforcing the same constraints as the Postgres layer
//!   (email uniqueness, version compare-and-swap)
//! - [`InMemoryProjectionStore`]: projection storage for updater tests
//! - [`InMemoryCache`]: TTL-free byte cache with a put/get/hit counter
//! - [`StubBillingClient`]: scripted billing outcomes with call capture
//! - [`FixedClock`]: deterministic time

use chrono::{DateTime, Utc};
use patientcare_core::environment::Clock;

pub mod billing;
pub mod cache;
pub mod event_bus;
pub mod projection_store;
pub mod stores;

pub use billing::{MockBillingTransport, StubBillingClient};
pub use cache::InMemoryCache;
pub use event_bus::InMemoryEventBus;
pub use projection_store::InMemoryProjectionStore;
pub use stores::{InMemoryAppointmentStore, InMemoryPatientStore};

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which should never
/// happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
