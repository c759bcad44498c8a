//! Cache Store Module
//!
//! Main cache engine combining HashMap lookup with an insertion-ordered list
//! for TTL expiry and bounded FIFO eviction. Not thread-safe on its own; see
//! [`TtlCache`](crate::cache::TtlCache) for the locked handle.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::cache::order::{InsertionOrder, Slot};
use crate::cache::CacheEntry;

// == Sweep Report ==
/// Outcome of one expiry-then-overflow sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries removed because `expires_at <= now`
    pub expired: usize,
    /// Entries removed to bring the count back under the bound
    pub evicted: usize,
    /// Entries left after the sweep
    pub remaining: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

// == Cache Store ==
/// Main cache storage with TTL expiry and insertion-order eviction.
///
/// Every key in `index` names exactly one live node in `order` holding an
/// entry with that key, and every live node is indexed. Both structures are
/// only ever changed together through `link` and `unlink`.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key to list slot
    index: HashMap<String, Slot>,
    /// Entries oldest to newest
    order: InsertionOrder<CacheEntry<V>>,
    /// Maximum number of entries, None = unbounded
    max_entries: Option<usize>,
    /// TTL used by `set`
    default_ttl: Duration,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `default_ttl` - TTL applied by `set`
    /// * `max_entries` - Maximum number of entries, 0 for unbounded
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            index: HashMap::new(),
            order: InsertionOrder::new(),
            max_entries: (max_entries > 0).then_some(max_entries),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    // == Lookup ==
    /// Returns the entry for `key` regardless of expiry.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        let slot = *self.index.get(key)?;
        self.order.get(slot)
    }

    // == Get ==
    /// Returns the value for `key` if present and not expired at `now`.
    ///
    /// Never mutates: expired entries are left for the next sweep and reads do
    /// not change eviction order.
    pub fn get(&self, key: &str, now: Instant) -> Option<&V> {
        self.entry(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| &entry.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Set ==
    /// Stores a value under the default TTL.
    ///
    /// Returns what was removed to bring the store back within its bound.
    pub fn set(&mut self, key: String, value: V) -> SweepReport {
        let ttl = self.default_ttl;
        self.set_expiration(key, value, ttl)
    }

    /// Stores a value with an explicit TTL.
    ///
    /// Any previous entry for the key is fully unlinked first, so the new
    /// entry always sits at the newest end of the eviction order. If the bound
    /// is exceeded afterwards a full sweep runs: expired entries go first and
    /// live entries are only dropped oldest-first if that is not enough.
    pub fn set_expiration(&mut self, key: String, value: V, ttl: Duration) -> SweepReport {
        self.release(&key);
        self.link(CacheEntry::new(key, value, ttl));
        self.trim_to_bound(Instant::now())
    }

    // == Release ==
    /// Removes one key, returning its entry if it was present.
    pub fn release(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let slot = *self.index.get(key)?;
        self.unlink(slot)
    }

    // == Delete ==
    /// Removes every listed key; missing keys are ignored.
    ///
    /// Returns the number of entries actually removed.
    pub fn delete<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.release(key.as_ref()).is_some())
            .count()
    }

    // == Eviction ==
    /// Runs the two-phase sweep: expired entries first, then overflow.
    pub fn eviction(&mut self, now: Instant) -> SweepReport {
        let expired = self.remove_expired(now);
        let evicted = self.remove_overflow();
        SweepReport {
            expired,
            evicted,
            remaining: self.len(),
        }
    }

    /// Removes every entry expired at `now`, walking oldest to newest.
    pub fn remove_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        let mut cursor = self.order.front();
        while let Some(slot) = cursor {
            // Capture the successor before unlinking the current node
            cursor = self.order.next(slot);
            let expired = self
                .order
                .get(slot)
                .is_some_and(|entry| entry.is_expired_at(now));
            if expired && self.unlink(slot).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Drops the oldest entries while the count exceeds the bound.
    pub fn remove_overflow(&mut self) -> usize {
        let Some(max) = self.max_entries else {
            return 0;
        };
        let mut removed = 0;
        while self.len() > max {
            let Some(front) = self.order.front() else {
                break;
            };
            if self.unlink(front).is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }

    // == Length ==
    /// Number of entries not yet evicted, expired or not.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates entries oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry<V>> {
        self.order.iter()
    }

    /// Checks that index and list describe the same set of entries.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.order.len()
            && self.index.iter().all(|(key, slot)| {
                self.order
                    .get(*slot)
                    .is_some_and(|entry| entry.key == *key)
            })
    }

    fn link(&mut self, entry: CacheEntry<V>) {
        let key = entry.key.clone();
        let slot = self.order.push_back(entry);
        self.index.insert(key, slot);
    }

    fn unlink(&mut self, slot: Slot) -> Option<CacheEntry<V>> {
        let entry = self.order.remove(slot)?;
        self.index.remove(&entry.key);
        Some(entry)
    }

    fn trim_to_bound(&mut self, now: Instant) -> SweepReport {
        match self.max_entries {
            Some(max) if self.len() > max => self.eviction(now),
            _ => SweepReport {
                remaining: self.len(),
                ..SweepReport::default()
            },
        }
    }
}

impl<V: fmt::Debug> fmt::Display for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, entry) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "\"{}\"={:?}", entry.key, entry.value)?;
        }
        write!(f, "}}")
    }
}
