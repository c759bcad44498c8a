//! Coalescing Loader Module
//!
//! Read-through front end over a cache: hits are served directly, misses are
//! handed to the broker so concurrent callers share a single load.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::cache::{CacheBackend, TtlCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::loader::broker::{spawn_broker, Reply, Request};
use crate::loader::source::Load;
use crate::loader::stats::{LoaderRecorder, LoaderStats};

// == Fetched ==
/// Outcome of a [`CoalescingLoader::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<V> {
    /// The value, from the cache or from a completed load
    Ready(V),
    /// The caller's timeout elapsed first; the load keeps running
    NotReady,
    /// The load failed; nothing was cached and a later fetch will retry
    Unavailable,
}

impl<V> Fetched<V> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetched::Ready(_))
    }

    /// Returns the value, dropping the reason for its absence.
    pub fn ready(self) -> Option<V> {
        match self {
            Fetched::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Converts into a `Result`, naming `key` in the error.
    pub fn into_result(self, key: &str) -> Result<V> {
        match self {
            Fetched::Ready(value) => Ok(value),
            Fetched::NotReady => Err(CacheError::NotReady(key.to_string())),
            Fetched::Unavailable => Err(CacheError::Unavailable(key.to_string())),
        }
    }
}

// == Coalescing Loader ==
/// Single-flight loader backed by a cache.
///
/// Cloning is cheap; all clones share the cache and the broker. The broker
/// task stops after the last clone is dropped and in-flight loads finish.
pub struct CoalescingLoader<V, C = TtlCache<V>> {
    cache: Arc<C>,
    requests: mpsc::Sender<Request<V>>,
    stats: Arc<LoaderRecorder>,
}

impl<V, C> Clone for CoalescingLoader<V, C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            requests: self.requests.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<V> CoalescingLoader<V, TtlCache<V>>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Builds a loader over a fresh [`TtlCache`] configured from `config`.
    ///
    /// Must be called inside a tokio runtime; the cache's sweeper and the
    /// broker both run on it.
    pub fn new<L: Load<V>>(config: &Config, load: L) -> Result<Self> {
        config.validate()?;
        Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Self::with_cache(TtlCache::new(config), load, config.request_buffer)
    }
}

impl<V, C> CoalescingLoader<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: CacheBackend<V>,
{
    /// Builds a loader over an injected cache backend.
    ///
    /// # Arguments
    /// * `cache` - Backend consulted on every fetch and written on every successful load
    /// * `load` - Blocking producer invoked once per miss episode
    /// * `request_buffer` - Capacity of the broker's request queue
    pub fn with_cache<L: Load<V>>(cache: C, load: L, request_buffer: usize) -> Result<Self> {
        if request_buffer == 0 {
            return Err(CacheError::InvalidConfig(
                "request_buffer must be at least 1".to_string(),
            ));
        }
        Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let cache = Arc::new(cache);
        let stats = Arc::new(LoaderRecorder::default());
        let (requests, rx) = mpsc::channel(request_buffer);
        spawn_broker(Arc::clone(&cache), Arc::new(load), Arc::clone(&stats), rx);

        Ok(Self {
            cache,
            requests,
            stats,
        })
    }

    // == Fetch ==
    /// Returns the value for `key`, loading it on a miss.
    ///
    /// A cache hit returns immediately without touching the broker. On a miss
    /// the caller waits for the shared load of this key, at most `timeout`
    /// (zero waits indefinitely). Timing out only abandons this caller's wait:
    /// the load still completes and populates the cache.
    pub async fn fetch(&self, key: &str, timeout: Duration) -> Fetched<V> {
        if let Some(value) = self.cache.get(key) {
            return Fetched::Ready(value);
        }

        let wait = self.wait_for(key);
        let reply = if timeout.is_zero() {
            wait.await
        } else {
            match tokio::time::timeout(timeout, wait).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.stats.record_timeout();
                    debug!("Fetch for {} timed out after {:?}", key, timeout);
                    return Fetched::NotReady;
                }
            }
        };

        match reply {
            Ok(Reply::Value(value)) => Fetched::Ready(value),
            Ok(Reply::Unavailable) => Fetched::Unavailable,
            Err(err) => {
                error!("Fetch for {} failed: {}", key, err);
                Fetched::Unavailable
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but reports a timeout or failed load as an error.
    pub async fn try_fetch(&self, key: &str, timeout: Duration) -> Result<V> {
        self.fetch(key, timeout).await.into_result(key)
    }

    /// Registers with the broker and waits for the fan-out.
    async fn wait_for(&self, key: &str) -> Result<Reply<V>> {
        let (reply, rx) = oneshot::channel();
        let request = Request {
            key: key.to_string(),
            reply,
        };
        self.requests
            .send(request)
            .await
            .map_err(|_| CacheError::BrokerClosed)?;
        rx.await.map_err(|_| CacheError::BrokerClosed)
    }

    // == Accessors ==
    /// Cache-only lookup, never triggers a load.
    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config() -> Config {
        Config::default()
            .with_default_ttl(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_millis(100))
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = CoalescingLoader::new(&config(), |key: &str| -> anyhow::Result<String> {
            Ok(key.to_string())
        });
        assert!(matches!(result, Err(CacheError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_buffer() {
        let cfg = config().with_request_buffer(0);
        let result = CoalescingLoader::new(&cfg, |key: &str| -> anyhow::Result<String> {
            Ok(key.to_string())
        });
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_fetch_hit_skips_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = CoalescingLoader::new(&config(), move |_: &str| -> anyhow::Result<u32> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        })
        .unwrap();

        loader.cache().set("k", 42);
        assert_eq!(loader.fetch("k", Duration::ZERO).await, Fetched::Ready(42));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_miss_loads_and_caches() {
        let loader = CoalescingLoader::new(&config(), |key: &str| -> anyhow::Result<String> {
            Ok(format!("value-of-{key}"))
        })
        .unwrap();

        assert_eq!(loader.get("x"), None);
        let value = loader.try_fetch("x", Duration::from_secs(5)).await.unwrap();
        assert_eq!(value, "value-of-x");
        assert_eq!(loader.get("x").as_deref(), Some("value-of-x"));
        assert_eq!(loader.stats().loads_started, 1);
    }

    #[tokio::test]
    async fn test_try_fetch_reports_unavailable() {
        let loader = CoalescingLoader::new(&config(), |_: &str| -> anyhow::Result<String> {
            anyhow::bail!("no such record")
        })
        .unwrap();

        let err = loader.try_fetch("gone", Duration::ZERO).await.unwrap_err();
        assert_eq!(err, CacheError::Unavailable("gone".to_string()));
        assert_eq!(loader.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn test_panicking_load_is_unavailable() {
        let loader = CoalescingLoader::new(&config(), |_: &str| -> anyhow::Result<String> {
            panic!("loader bug")
        })
        .unwrap();

        assert_eq!(
            loader.fetch("k", Duration::ZERO).await,
            Fetched::Unavailable
        );
    }

    #[tokio::test]
    async fn test_timeout_returns_not_ready() {
        let loader = CoalescingLoader::new(&config(), |_: &str| -> anyhow::Result<u8> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(1)
        })
        .unwrap();

        let err = loader
            .try_fetch("slow", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::NotReady("slow".to_string()));
        assert_eq!(loader.stats().timeouts, 1);
    }

    /// In-memory backend without expiry, to exercise injection.
    #[derive(Default)]
    struct MapBackend {
        map: Mutex<HashMap<String, String>>,
        writes: AtomicUsize,
    }

    impl CacheBackend<String> for MapBackend {
        fn get(&self, key: &str) -> Option<String> {
            self.map.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: String) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.map.lock().unwrap().insert(key.to_string(), value);
        }
    }

    #[tokio::test]
    async fn test_injected_backend_receives_write_through() {
        let loader = CoalescingLoader::with_cache(
            MapBackend::default(),
            |key: &str| -> anyhow::Result<String> { Ok(key.repeat(2)) },
            8,
        )
        .unwrap();

        assert_eq!(loader.fetch("ab", Duration::ZERO).await, Fetched::Ready("abab".to_string()));
        assert_eq!(loader.fetch("ab", Duration::ZERO).await, Fetched::Ready("abab".to_string()));
        assert_eq!(loader.cache().writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetched_helpers() {
        assert!(Fetched::Ready(1).is_ready());
        assert_eq!(Fetched::Ready(1).ready(), Some(1));
        assert_eq!(Fetched::<u8>::NotReady.ready(), None);
        assert_eq!(
            Fetched::<u8>::Unavailable.into_result("k"),
            Err(CacheError::Unavailable("k".to_string()))
        );
    }
}
