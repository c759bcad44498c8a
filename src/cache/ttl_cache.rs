//! TTL Cache Module
//!
//! Thread-safe handle around the cache store: one reader/writer lock, atomic
//! statistics and an owned background sweeper.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheStats, CacheStore, StatsRecorder, SweepReport};
use crate::config::Config;
use crate::tasks::{spawn_sweeper, Sweep};

// == TTL Cache ==
/// Concurrent key/value cache with per-entry expiry and a FIFO entry bound.
///
/// Cloning is cheap and every clone shares the same entries. The periodic
/// sweeper lives as long as at least one handle does.
///
/// Lookups take the shared lock; writes and sweeps take the exclusive lock,
/// so a sweep's expiry detection and removal happen atomically.
pub struct TtlCache<V> {
    inner: Arc<Shared<V>>,
}

pub(crate) struct Shared<V> {
    store: RwLock<CacheStore<V>>,
    stats: StatsRecorder,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache and starts its periodic sweeper.
    ///
    /// The sweeper runs every `config.sweep_interval` on the current tokio
    /// runtime. With a zero interval, or when called outside a runtime, no
    /// sweeper is started and eviction only happens through [`eviction`](Self::eviction)
    /// and the entry bound enforced by `set`.
    pub fn new(config: &Config) -> Self {
        let cache = Self::without_sweeper(config);

        if config.sweep_interval.is_zero() {
            debug!("Sweep interval is zero, periodic eviction disabled");
            return cache;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let task = spawn_sweeper(
                    &handle,
                    Arc::downgrade(&cache.inner),
                    config.sweep_interval,
                );
                *cache.inner.sweeper.lock() = Some(task);
            }
            Err(_) => {
                warn!("No tokio runtime available, periodic eviction disabled");
            }
        }

        cache
    }

    /// Creates a cache that is only swept by explicit [`eviction`](Self::eviction) calls.
    pub fn without_sweeper(config: &Config) -> Self {
        Self {
            inner: Arc::new(Shared {
                store: RwLock::new(CacheStore::new(config.default_ttl, config.max_entries)),
                stats: StatsRecorder::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    // == Get ==
    /// Returns a copy of the value for `key`.
    ///
    /// Misses are not errors. Reads never extend expiry or change eviction
    /// order; an expired entry awaiting its sweep reads as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.inner.store.read().get(key, Instant::now()).cloned();
        match value {
            Some(_) => self.inner.stats.record_hit(),
            None => self.inner.stats.record_miss(),
        }
        value
    }

    /// Like [`get`](Self::get), but leaves the hit and miss counters alone.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.inner.store.read().get(key, Instant::now()).cloned()
    }

    // == Set ==
    /// Inserts or replaces `key` with the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let report = self.inner.store.write().set(key.into(), value);
        self.inner.stats.record_sweep(&report);
    }

    /// Inserts or replaces `key` with an explicit TTL.
    ///
    /// A zero TTL stores an entry that is already expired and removed by the
    /// next sweep, or by the next write that exceeds the bound.
    pub fn set_expiration(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let report = self
            .inner
            .store
            .write()
            .set_expiration(key.into(), value, ttl);
        self.inner.stats.record_sweep(&report);
    }

    // == Delete ==
    /// Removes every listed key. Missing keys are ignored.
    ///
    /// Returns the number of entries removed.
    pub fn delete<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.inner.store.write().delete(keys)
    }

    /// Same as [`delete`](Self::delete).
    pub fn release<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.delete(keys)
    }

    // == Size ==
    /// Number of entries not yet evicted.
    ///
    /// May include entries that have expired but have not been swept yet.
    pub fn size(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.read().is_empty()
    }

    /// Whether `key` is stored, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.store.read().contains_key(key)
    }

    // == Eviction ==
    /// Runs one sweep now: drop expired entries, then the oldest entries
    /// beyond the bound.
    pub fn eviction(&self) -> SweepReport {
        self.inner.sweep()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let entries = self.size();
        self.inner.stats.snapshot(entries)
    }

    // == Sweeper Lifecycle ==
    /// Stops the periodic sweeper. Explicit eviction keeps working.
    pub fn stop_sweeper(&self) {
        if let Some(task) = self.inner.sweeper.lock().take() {
            task.abort();
            debug!("Periodic sweeper stopped");
        }
    }

    pub fn has_sweeper(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.inner.store.read().is_consistent()
    }
}

impl<V> Sweep for Shared<V>
where
    V: Send + Sync + 'static,
{
    fn sweep(&self) -> SweepReport {
        let report = self.store.write().eviction(Instant::now());
        self.stats.record_sweep(&report);
        report
    }
}

impl<V> Drop for Shared<V> {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.abort();
        }
    }
}

impl<V: fmt::Debug> fmt::Display for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.store.read(), f)
    }
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.inner.store.read();
        f.debug_struct("TtlCache")
            .field("entries", &store.len())
            .field("max_entries", &store.max_entries())
            .field("default_ttl", &store.default_ttl())
            .finish()
    }
}
