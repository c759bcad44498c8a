//! Configuration Module
//!
//! Construction-time settings for the cache, its sweeper and the loader broker.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache and loader configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// There is no runtime reconfiguration: a value is read once when the cache or
/// loader is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL applied by `set` when no per-entry TTL is given
    pub default_ttl: Duration,
    /// Interval between background sweeps, zero disables the sweeper
    pub sweep_interval: Duration,
    /// Maximum number of entries kept after a sweep, zero means unbounded
    pub max_entries: usize,
    /// Capacity of the broker's request queue
    pub request_buffer: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    /// - `MAX_ENTRIES` - Maximum cache entries, 0 for unbounded (default: 1000)
    /// - `REQUEST_BUFFER` - Broker request queue capacity (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: env_var("DEFAULT_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_ttl),
            sweep_interval: env_var("SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            max_entries: env_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            request_buffer: env_var("REQUEST_BUFFER").unwrap_or(defaults.request_buffer),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_request_buffer(mut self, capacity: usize) -> Self {
        self.request_buffer = capacity;
        self
    }

    /// Returns the entry bound, or None when the cache is unbounded.
    pub fn entry_limit(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries)
    }

    /// Checks values that cannot be honored.
    ///
    /// A zero TTL is accepted (entries expire on the next sweep); a zero
    /// request buffer is not, since tokio channels need a capacity of at least one.
    pub fn validate(&self) -> Result<()> {
        if self.request_buffer == 0 {
            return Err(CacheError::InvalidConfig(
                "request_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
            max_entries: 1000,
            request_buffer: 100,
        }
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
