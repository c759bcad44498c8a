//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and bounded FIFO eviction.

mod backend;
mod entry;
mod order;
mod stats;
mod store;
mod ttl_cache;


// Re-export public types
pub use backend::CacheBackend;
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::SweepReport;
pub use ttl_cache::TtlCache;

pub(crate) use stats::StatsRecorder;
pub(crate) use store::CacheStore;
