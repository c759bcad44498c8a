//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A single cached value together with its key and expiration instant.
///
/// Entries are never mutated after construction; replacing a key builds a new
/// entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The key this entry is indexed under
    pub key: String,
    /// The stored value
    pub value: V,
    /// Instant at which the entry stops being served
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    ///
    /// A zero TTL yields an entry that is already expired. TTLs too large to
    /// represent saturate to roughly thirty years.
    pub fn new(key: String, value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS));

        Self {
            key,
            value,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// zero TTL is expired immediately.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Returns the remaining time to live, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;
