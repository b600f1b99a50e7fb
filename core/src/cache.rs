//! Explicit cache seam for read-side query results.
//!
//! Replaces declarative caching annotations with a `get/put/invalidate`
//! interface invoked directly by the command service, so eviction
//! ordering and key composition are auditable in code.
//!
//! Values are JSON bytes with date/time fields in canonical textual form
//! (chrono's RFC 3339 serde); [`get_typed`]/[`put_typed`] reconstruct the
//! original type on read rather than a generic structure.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Key namespace for paginated patient listings.
pub const LISTING_PREFIX: &str = "patients:";

/// Key namespace for single-patient lookups.
pub const PATIENT_PREFIX: &str = "patient:";

/// Errors from cache operations.
///
/// Callers treat cache failures as misses: a broken cache degrades
/// latency, never correctness.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value failed to serialize or deserialize.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The backing store failed.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Keyed byte cache with TTL expiry and prefix invalidation.
///
/// Writes are all-or-nothing: a concurrent reader sees either the old
/// value or the new one, never a torn write.
pub trait Cache: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the read fails.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>>;

    /// Store a value. `ttl = None` uses the cache's configured default.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the write fails.
    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the removal fails.
    fn invalidate(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Patient mutations evict the whole listing namespace: a page's
    /// membership is not locally derivable from a single record change.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the removal fails.
    fn invalidate_prefix(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;
}

/// Fetch and deserialize a typed value from the cache.
///
/// # Errors
///
/// Returns [`CacheError::Serialization`] if a stored value no longer
/// decodes to `T`, or [`CacheError::Backend`] on read failure.
pub async fn get_typed<T: DeserializeOwned>(
    cache: &dyn Cache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Serialize and store a typed value in the cache.
///
/// # Errors
///
/// Returns [`CacheError::Serialization`] if the value fails to encode, or
/// [`CacheError::Backend`] on write failure.
pub async fn put_typed<T: Serialize>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.put(key, bytes, ttl).await
}
