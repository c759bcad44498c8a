//! Integration Tests for CoalescingLoader
//!
//! Covers single-flight loading, per-caller timeouts, failure handling and
//! the write-through into the cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use espresso_cache::{CacheError, CoalescingLoader, Config, Fetched, TtlCache};

// == Helper Functions ==

fn config() -> Config {
    Config::default()
        .with_default_ttl(Duration::from_secs(60))
        .with_sweep_interval(Duration::from_millis(50))
}

/// Builds a loader whose load sleeps for `delay` and counts invocations.
fn slow_loader(
    config: &Config,
    delay: Duration,
) -> (CoalescingLoader<String>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let loader = CoalescingLoader::new(config, move |key: &str| -> anyhow::Result<String> {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(delay);
        Ok(format!("value-for-{key}"))
    })
    .expect("loader should build inside a runtime");
    (loader, calls)
}

// == Coalescing Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_share_one_load() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(300));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let loader = loader.clone();
        handles.push(tokio::spawn(async move {
            loader.fetch("k", Duration::ZERO).await
        }));
    }

    for handle in handles {
        let fetched = handle.await.expect("Task should not panic");
        assert_eq!(fetched, Fetched::Ready("value-for-k".to_string()));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "Load must run exactly once");
    let stats = loader.stats();
    assert_eq!(stats.loads_started, 1);
    assert_eq!(stats.coalesced, 31);
}

#[tokio::test]
async fn test_miss_counted_once_in_cache_stats() {
    let (loader, _calls) = slow_loader(&config(), Duration::from_millis(10));

    loader.try_fetch("k", Duration::ZERO).await.unwrap();
    loader.try_fetch("k", Duration::ZERO).await.unwrap();

    let stats = loader.cache().stats();
    assert_eq!(stats.misses, 1, "Broker re-check must not count as a lookup");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.hit_rate(), 0.5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_load_in_parallel() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(300));

    let started = Instant::now();
    let (a, b) = tokio::join!(
        loader.fetch("a", Duration::ZERO),
        loader.fetch("b", Duration::ZERO)
    );

    assert!(a.is_ready() && b.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(
        started.elapsed() < Duration::from_millis(550),
        "Loads for different keys should overlap"
    );
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(10));

    assert!(loader.fetch("k", Duration::ZERO).await.is_ready());
    assert!(loader.fetch("k", Duration::ZERO).await.is_ready());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(loader.cache().size(), 1);
}

// == Timeout Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_isolated_per_caller() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(200));

    let impatient = {
        let loader = loader.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let fetched = loader.fetch("k", Duration::from_millis(10)).await;
            (fetched, started.elapsed())
        })
    };
    let patient = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.fetch("k", Duration::ZERO).await })
    };

    let (fetched, waited) = impatient.await.unwrap();
    assert_eq!(fetched, Fetched::NotReady);
    assert!(waited < Duration::from_millis(150), "Timeout fired late: {waited:?}");

    assert_eq!(
        patient.await.unwrap(),
        Fetched::Ready("value-for-k".to_string())
    );
    assert_eq!(loader.get("k").as_deref(), Some("value-for-k"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timed_out_load_still_populates_cache() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(150));

    let err = loader
        .try_fetch("k", Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err, CacheError::NotReady("k".to_string()));

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(loader.get("k").as_deref(), Some("value-for-k"));
    assert!(loader.fetch("k", Duration::from_millis(1)).await.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(loader.stats().timeouts, 1);
}

#[tokio::test]
async fn test_waiter_joining_after_timeout_gets_value() {
    let (loader, calls) = slow_loader(&config(), Duration::from_millis(200));

    assert_eq!(
        loader.fetch("k", Duration::from_millis(20)).await,
        Fetched::NotReady
    );
    assert_eq!(
        loader.fetch("k", Duration::from_secs(5)).await,
        Fetched::Ready("value-for-k".to_string())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// == Failure Tests ==

#[tokio::test]
async fn test_failed_load_is_retried_by_next_fetch() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let loader = CoalescingLoader::new(&config(), move |key: &str| -> anyhow::Result<String> {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("upstream unavailable for {key}");
        }
        Ok("recovered".to_string())
    })
    .unwrap();

    assert_eq!(loader.fetch("k", Duration::ZERO).await, Fetched::Unavailable);
    assert_eq!(loader.get("k"), None, "Failures must not be cached");

    assert_eq!(
        loader.fetch("k", Duration::ZERO).await,
        Fetched::Ready("recovered".to_string())
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(loader.stats().load_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_fans_out_to_every_waiter() {
    let loader = CoalescingLoader::new(&config(), |_: &str| -> anyhow::Result<String> {
        std::thread::sleep(Duration::from_millis(100));
        anyhow::bail!("boom")
    })
    .unwrap();

    let results = fetch_concurrently(&loader, 8).await;
    assert!(results.iter().all(|f| *f == Fetched::Unavailable));
    assert_eq!(loader.stats().loads_started, 1);
}

async fn fetch_concurrently(loader: &CoalescingLoader<String>, n: usize) -> Vec<Fetched<String>> {
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.fetch("k", Duration::ZERO).await })
        })
        .collect();

    let mut results = Vec::with_capacity(n);
    for handle in handles {
        results.push(handle.await.expect("Task should not panic"));
    }
    results
}

// == Expiry Tests ==

#[tokio::test]
async fn test_expired_value_starts_new_miss_episode() {
    let cfg = config()
        .with_default_ttl(Duration::from_millis(100))
        .with_sweep_interval(Duration::from_millis(20));
    let (loader, calls) = slow_loader(&cfg, Duration::from_millis(5));

    assert!(loader.fetch("k", Duration::ZERO).await.is_ready());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(loader.get("k"), None);

    assert!(loader.fetch("k", Duration::ZERO).await.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Injection Tests ==

#[tokio::test]
async fn test_with_cache_shares_existing_ttl_cache() {
    let cache = TtlCache::new(&config());
    cache.set("preloaded", "from-cache".to_string());

    let loader = CoalescingLoader::with_cache(
        cache.clone(),
        |_: &str| -> anyhow::Result<String> { Ok("from-load".to_string()) },
        4,
    )
    .unwrap();

    assert_eq!(
        loader.fetch("preloaded", Duration::ZERO).await,
        Fetched::Ready("from-cache".to_string())
    );
    assert!(loader.fetch("other", Duration::ZERO).await.is_ready());
    assert_eq!(cache.get("other").as_deref(), Some("from-load"));
}

#[test]
fn test_loader_inside_block_on() {
    let value = tokio_test::block_on(async {
        let (loader, _) = slow_loader(&config(), Duration::from_millis(1));
        loader.try_fetch("k", Duration::from_secs(5)).await
    });

    assert_eq!(value.unwrap(), "value-for-k");
}
