//! Periodic Sweeper Task
//!
//! Background task that periodically runs the expiry-then-overflow sweep.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::SweepReport;

/// Something that can run one eviction sweep.
pub trait Sweep: Send + Sync + 'static {
    fn sweep(&self) -> SweepReport;
}

/// Spawns a background task that sweeps `target` every `interval`.
///
/// The task only holds a weak reference, so it never keeps the cache alive:
/// once the last strong handle is dropped the next tick ends the loop. The
/// owner may also abort the returned handle to stop it earlier.
///
/// # Arguments
/// * `handle` - Runtime to spawn on
/// * `target` - Weak reference to the swept state
/// * `interval` - Time between sweeps, independent of any entry TTL
pub fn spawn_sweeper<T: Sweep>(
    handle: &Handle,
    target: Weak<T>,
    interval: Duration,
) -> JoinHandle<()> {
    handle.spawn(async move {
        info!(
            "Starting periodic sweeper with interval of {} ms",
            interval.as_millis()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(target) = target.upgrade() else {
                debug!("Swept state dropped, sweeper exiting");
                break;
            };
            let report = target.sweep();
            drop(target);

            if report.removed() > 0 {
                info!(
                    "Sweep: removed {} expired and {} overflow entries, {} remaining",
                    report.expired, report.evicted, report.remaining
                );
            } else {
                debug!("Sweep: nothing to remove");
            }
        }
    })
}
