//! In-memory cache with TTL expiry.
//!
//! Doubles as the test cache and the reference implementation of the
//! `Cache` seam's semantics: all-or-nothing writes under a lock, lazy
//! expiry on read, prefix invalidation.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on lock poisoning

use chrono::Duration as ChronoDuration;
use patientcare_core::cache::{Cache, CacheError};
use patientcare_core::environment::Clock;
use patientcare_core::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-memory [`Cache`] with per-entry TTL and a hit/miss counter.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl InMemoryCache {
    /// Create a cache with the given default TTL.
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Hits and misses observed so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn stats(&self) -> (u64, u64) {
        (*self.hits.lock().unwrap(), *self.misses.lock().unwrap())
    }

    /// Number of live (unexpired) entry slots, including lazily expired
    /// ones not yet collected.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Option<Duration>) -> DateTime<Utc> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.clock.now()
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(0))
    }
}

impl Cache for InMemoryCache {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let now = self.clock.now();
            #[allow(clippy::unwrap_used)]
            let entries = self.entries.read().unwrap();
            let hit = entries
                .get(&key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.value.clone());
            drop(entries);

            #[allow(clippy::unwrap_used)]
            if hit.is_some() {
                *self.hits.lock().unwrap() += 1;
            } else {
                *self.misses.lock().unwrap() += 1;
            }
            Ok(hit)
        })
    }

    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let entry = Entry {
                value,
                expires_at: self.expiry(ttl),
            };
            #[allow(clippy::unwrap_used)]
            self.entries.write().unwrap().insert(key, entry);
            Ok(())
        })
    }

    fn invalidate(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            self.entries.write().unwrap().remove(&key);
            Ok(())
        })
    }

    fn invalidate_prefix(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            #[allow(clippy::unwrap_used)]
            self.entries
                .write()
                .unwrap()
                .retain(|key, _| !key.starts_with(&prefix));
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::FixedClock;

    fn cache_at(time: &str) -> InMemoryCache {
        let clock = FixedClock::new(
            DateTime::parse_from_rfc3339(time)
                .unwrap()
                .with_timezone(&Utc),
        );
        InMemoryCache::new(Duration::from_secs(3600), Arc::new(clock))
    }

    #[tokio::test]
    async fn get_returns_stored_value() {
        let cache = cache_at("2025-01-01T00:00:00Z");
        cache.put("k", vec![1, 2], None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![1, 2]));
        assert_eq!(cache.stats(), (1, 0));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cache = InMemoryCache::new(Duration::from_secs(0), clock);
        cache.put("k", vec![1], None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_invalidation_spares_other_namespaces() {
        let cache = cache_at("2025-01-01T00:00:00Z");
        cache.put("patients:1:10:asc:name", vec![1], None).await.unwrap();
        cache.put("patients:2:10:asc:name", vec![2], None).await.unwrap();
        cache.put("patient:abc", vec![3], None).await.unwrap();

        cache.invalidate_prefix("patients:").await.unwrap();

        assert_eq!(cache.get("patients:1:10:asc:name").await.unwrap(), None);
        assert_eq!(cache.get("patient:abc").await.unwrap(), Some(vec![3]));
    }
}
