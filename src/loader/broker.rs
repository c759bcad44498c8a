//! Load Broker Module
//!
//! Single task that owns the waiter sets. It consumes request events from
//! callers and result events from load workers strictly one at a time, which
//! is what guarantees a single load per key per miss episode.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheBackend;
use crate::loader::source::Load;
use crate::loader::stats::LoaderRecorder;

// == Events ==
/// What a waiter receives when its key's load completes.
#[derive(Debug, Clone)]
pub(crate) enum Reply<V> {
    Value(V),
    Unavailable,
}

/// A caller registering interest in `key`.
pub(crate) struct Request<V> {
    pub key: String,
    pub reply: oneshot::Sender<Reply<V>>,
}

/// Produced exactly once per started load.
struct LoadResult<V> {
    key: String,
    outcome: Result<V, String>,
}

type WaiterSet<V> = Vec<oneshot::Sender<Reply<V>>>;

// == Broker ==
pub(crate) struct Broker<V, C, L> {
    cache: Arc<C>,
    load: Arc<L>,
    stats: Arc<LoaderRecorder>,
    waiting: HashMap<String, WaiterSet<V>>,
    results_tx: mpsc::UnboundedSender<LoadResult<V>>,
}

/// Spawns the broker loop on the current runtime.
///
/// The loop ends once `requests` is closed (every loader handle dropped) and
/// all in-flight loads have reported back, so late results still reach the
/// cache.
pub(crate) fn spawn_broker<V, C, L>(
    cache: Arc<C>,
    load: Arc<L>,
    stats: Arc<LoaderRecorder>,
    requests: mpsc::Receiver<Request<V>>,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    C: CacheBackend<V>,
    L: Load<V>,
{
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let broker = Broker {
        cache,
        load,
        stats,
        waiting: HashMap::new(),
        results_tx,
    };
    tokio::spawn(broker.run(requests, results_rx))
}

impl<V, C, L> Broker<V, C, L>
where
    V: Clone + Send + Sync + 'static,
    C: CacheBackend<V>,
    L: Load<V>,
{
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request<V>>,
        mut results: mpsc::UnboundedReceiver<LoadResult<V>>,
    ) {
        debug!("Load broker started");
        let mut accepting = true;

        loop {
            tokio::select! {
                request = requests.recv(), if accepting => match request {
                    Some(request) => self.on_request(request),
                    None => {
                        debug!("Request queue closed, draining {} in-flight loads", self.waiting.len());
                        accepting = false;
                    }
                },
                Some(result) = results.recv() => self.on_result(result),
                else => break,
            }

            if !accepting && self.waiting.is_empty() {
                break;
            }
        }

        debug!("Load broker stopped");
    }

    // == Request Event ==
    fn on_request(&mut self, request: Request<V>) {
        let Request { key, reply } = request;

        if let Some(waiters) = self.waiting.get_mut(&key) {
            // Forget callers that already timed out
            waiters.retain(|waiter| !waiter.is_closed());
            waiters.push(reply);
            self.stats.record_coalesced();
            debug!("Joined in-flight load for {} ({} waiting)", key, waiters.len());
            return;
        }

        // The previous episode may have written through after this caller missed
        if let Some(value) = self.cache.peek(&key) {
            let _ = reply.send(Reply::Value(value));
            return;
        }

        self.waiting.insert(key.clone(), vec![reply]);
        self.start_load(key);
    }

    fn start_load(&self, key: String) {
        self.stats.record_load_started();
        debug!("Starting load for {}", key);

        let load = Arc::clone(&self.load);
        let results = self.results_tx.clone();

        tokio::spawn(async move {
            let worker_key = key.clone();
            let outcome = match tokio::task::spawn_blocking(move || load.load(&worker_key)).await
            {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(format!("{err:#}")),
                Err(err) => Err(format!("load task failed: {err}")),
            };
            // The broker holds the receiver until every load reported back
            let _ = results.send(LoadResult { key, outcome });
        });
    }

    // == Result Event ==
    fn on_result(&mut self, result: LoadResult<V>) {
        let LoadResult { key, outcome } = result;

        let waiters = self.waiting.remove(&key).unwrap_or_else(|| {
            warn!("Load result for {} arrived without a waiter set", key);
            Vec::new()
        });

        let reply = match outcome {
            Ok(value) => {
                self.cache.set(&key, value.clone());
                Reply::Value(value)
            }
            Err(reason) => {
                self.stats.record_failure();
                warn!("Load for {} failed: {}", key, reason);
                Reply::Unavailable
            }
        };

        let total = waiters.len();
        let mut delivered = 0;
        for waiter in waiters {
            if waiter.send(reply.clone()).is_ok() {
                delivered += 1;
            }
        }

        debug!("Dispatched {} to {} of {} waiters", key, delivered, total);
    }
}
