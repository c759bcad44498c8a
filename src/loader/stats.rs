//! Loader Statistics Module
//!
//! Counters describing how the broker handled miss episodes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Loader Stats ==
/// Point-in-time snapshot of loader metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    /// Loads started, one per miss episode
    pub loads_started: u64,
    /// Requests attached to a load that was already in flight
    pub coalesced: u64,
    /// Loads that ended in an error or a panic
    pub load_failures: u64,
    /// Callers that gave up waiting
    pub timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LoaderRecorder {
    loads_started: AtomicU64,
    coalesced: AtomicU64,
    load_failures: AtomicU64,
    timeouts: AtomicU64,
}

impl LoaderRecorder {
    pub fn record_load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoaderStats {
        LoaderStats {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
