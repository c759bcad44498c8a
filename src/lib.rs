//! Espresso Cache - an in-process expiring cache with single-flight loading
//!
//! [`TtlCache`] stores values with a per-entry TTL and an optional entry bound
//! enforced oldest-first. [`CoalescingLoader`] sits in front of a cache and
//! makes sure concurrent misses for one key trigger a single load.

pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod tasks;

pub use cache::{CacheBackend, CacheStats, SweepReport, TtlCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use loader::{CoalescingLoader, Fetched, Load, LoaderStats};
