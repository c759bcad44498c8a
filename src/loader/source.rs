//! Load Source Module
//!
//! The external collaborator that produces values on a cache miss.

// == Load ==
/// A blocking producer of values, e.g. a remote fetch.
///
/// Implementations may block for as long as they need; the broker runs each
/// call on tokio's blocking pool and may invoke loads for different keys
/// concurrently. An `Err` is reported to waiters as an unavailable value and
/// nothing is cached.
pub trait Load<V>: Send + Sync + 'static {
    fn load(&self, key: &str) -> anyhow::Result<V>;
}

impl<V, F> Load<V> for F
where
    F: Fn(&str) -> anyhow::Result<V> + Send + Sync + 'static,
{
    fn load(&self, key: &str) -> anyhow::Result<V> {
        self(key)
    }
}
