//! Cache Backend Module
//!
//! The seam the coalescing loader uses to read and write its cache, so a
//! different store can be injected in place of [`TtlCache`].

use crate::cache::TtlCache;

// == Cache Backend ==
/// Minimal cache contract needed by the loader: a lookup and a write-through.
pub trait CacheBackend<V>: Send + Sync + 'static {
    /// Returns the cached value for `key`, if any.
    fn get(&self, key: &str) -> Option<V>;

    /// Lookup made on the loader's behalf rather than a caller's.
    ///
    /// Backends that keep hit/miss statistics override this so internal
    /// re-checks are not counted twice.
    fn peek(&self, key: &str) -> Option<V> {
        self.get(key)
    }

    /// Stores `value` under `key` using the backend's own expiry policy.
    fn set(&self, key: &str, value: V);
}

impl<V> CacheBackend<V> for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str) -> Option<V> {
        TtlCache::get(self, key)
    }

    fn peek(&self, key: &str) -> Option<V> {
        TtlCache::peek(self, key)
    }

    fn set(&self, key: &str, value: V) {
        TtlCache::set(self, key, value)
    }
}
