//! Service configuration.

use std::time::Duration;

/// Tunables for the patient command service.
#[derive(Clone, Debug)]
pub struct PatientServiceConfig {
    /// TTL for cached listing pages and single-patient entries.
    pub cache_ttl: Duration,
}

impl PatientServiceConfig {
    /// Default cache TTL: 60 minutes.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

    /// Create a config with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cache_ttl: Self::DEFAULT_CACHE_TTL,
        }
    }

    /// Override the cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

impl Default for PatientServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}
