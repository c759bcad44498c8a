//! Loader Module
//!
//! Single-flight loading on top of a cache. A miss registers the caller with
//! a broker task; the first registration for a key starts the load and every
//! later one during the same miss episode waits for that result.

mod broker;
mod coalescing;
mod source;
mod stats;

pub use coalescing::{CoalescingLoader, Fetched};
pub use source::Load;
pub use stats::LoaderStats;
