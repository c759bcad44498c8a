//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Sweeper: runs the expiry-then-overflow eviction pass at a fixed interval

mod sweeper;

pub use sweeper::{spawn_sweeper, Sweep};
