//! Espresso Cache - loader walkthrough
//!
//! Fetches a slow value several times, with and without a timeout, to show
//! single-flight loading and how a timed-out caller leaves the load running.

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use espresso_cache::{CoalescingLoader, Config, Fetched};

/// Time the demo load takes to produce a value.
const LOAD_DELAY: Duration = Duration::from_secs(5);

/// Main entry point for the loader walkthrough.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build a loader whose load function sleeps for five seconds
/// 4. Fetch the same key with a one second timeout, then without one
/// 5. Fetch again to show the cache now answers immediately
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "espresso_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting loader walkthrough");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={:?}, sweep_interval={:?}, request_buffer={}",
        config.max_entries, config.default_ttl, config.sweep_interval, config.request_buffer
    );

    let loader = CoalescingLoader::new(&config, |key: &str| -> anyhow::Result<Vec<u32>> {
        info!("Loading: {}", key);
        std::thread::sleep(LOAD_DELAY);
        Ok(vec![1, 2])
    })
    .context("failed to build loader")?;

    let timeout = Duration::from_secs(1);
    let plan = [
        ("Fetch 1", timeout),
        ("Fetch 2", timeout),
        ("Fetch 3", Duration::ZERO),
        ("Fetch 4", timeout),
        ("Fetch 5", timeout),
    ];

    for (label, wait) in plan {
        match loader.fetch("x", wait).await {
            Fetched::Ready(value) => info!("{}: {:?}", label, value),
            Fetched::NotReady => info!("{}: not ready", label),
            Fetched::Unavailable => info!("{}: unavailable", label),
        }
    }

    info!("Cache: {}", loader.cache());
    info!(
        "Loader stats: {}",
        serde_json::to_string(&loader.stats()).context("failed to encode loader stats")?
    );
    info!(
        "Cache stats: {}",
        serde_json::to_string(&loader.cache().stats()).context("failed to encode cache stats")?
    );

    Ok(())
}
