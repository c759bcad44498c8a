//! Error types for the cache and loader
//!
//! Provides unified error handling using thiserror. A cache miss is never an
//! error; these variants only surface through the `Result`-returning helpers.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and the coalescing loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The caller's wait deadline passed before the load result arrived
    #[error("Value not ready: {0}")]
    NotReady(String),

    /// The load function failed for this key
    #[error("Value unavailable: {0}")]
    Unavailable(String),

    /// The broker task is no longer running
    #[error("Loader broker has shut down")]
    BrokerClosed,

    /// The loader was built outside a tokio runtime
    #[error("No tokio runtime available to run the loader broker")]
    NoRuntime,

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache and loader.
pub type Result<T> = std::result::Result<T, CacheError>;
