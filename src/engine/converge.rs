use std::collections::HashMap;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::trace;
use tracing::warn;
use tracing::Instrument;

use super::build_outcome;
use super::BatchResolver;
use super::ConvergeStats;
use super::DedupSet;
use super::ResultEntry;
use super::RoundOutcome;
use super::StatsRecorder;
use crate::utils::async_task::panic_message;
use crate::utils::async_task::spawn_task;
use crate::ConvergeConfig;
use crate::Error;
use crate::PriorityMutex;
use crate::ResolutionError;
use crate::Result;

/// Request-coalescing batch engine.
///
/// Concurrent [`submit`](Self::submit) calls are queued, and each drain
/// worker swaps out everything queued since the previous swap, resolves the
/// deduplicated keys with a single [`BatchResolver`] call and fans the result
/// back out to every caller of the round. At most `worker_count` resolution
/// calls are in flight at once.
///
/// The engine must be created inside a tokio runtime. Dropping it stops the
/// workers the same way [`stop`](Self::stop) does.
pub struct Converge<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<K, V>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

/// One caller's submission, consumed exactly once by the worker that drains
/// the round containing it.
struct PendingRequest<K, V> {
    keys: Vec<K>,
    responder: oneshot::Sender<RoundOutcome<K, V>>,
}

impl<K, V> PendingRequest<K, V> {
    fn respond(
        self,
        outcome: RoundOutcome<K, V>,
    ) {
        if self.responder.send(outcome).is_err() {
            trace!("caller went away before its round completed");
        }
    }
}

struct Shared<K, V> {
    name: String,
    pending: PriorityMutex<Vec<PendingRequest<K, V>>>,
    resolver: Arc<dyn BatchResolver<K, V>>,
    // Saturating dispatch signal, capacity = worker count
    dispatch_tx: mpsc::Sender<()>,
    dispatch_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    shutdown: CancellationToken,
    coalesce_window: Duration,
    live_workers: AtomicUsize,
    stats: StatsRecorder,
}

impl<K, V> Converge<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Validates `config` and starts `config.worker_count` drain workers.
    pub fn new<R>(
        resolver: R,
        config: ConvergeConfig,
    ) -> Result<Self>
    where
        R: BatchResolver<K, V> + 'static,
    {
        Self::with_resolver(Arc::new(resolver), config)
    }

    /// Same as [`new`](Self::new), for a resolver that is already shared.
    pub fn with_resolver(
        resolver: Arc<dyn BatchResolver<K, V>>,
        config: ConvergeConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        let worker_count = config.worker_count;
        let (dispatch_tx, dispatch_rx) = mpsc::channel(worker_count);

        let shared = Arc::new(Shared {
            stats: StatsRecorder::new(&config.name),
            coalesce_window: config.coalesce_window(),
            name: config.name,
            pending: PriorityMutex::new(Vec::new()),
            resolver,
            dispatch_tx,
            dispatch_rx: tokio::sync::Mutex::new(dispatch_rx),
            shutdown: CancellationToken::new(),
            live_workers: AtomicUsize::new(worker_count),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let shared = shared.clone();
            spawn_task(
                &format!("{}-worker-{}", shared.name, worker_id),
                move || shared.run(worker_id),
                &mut handles,
            );
        }

        info!(
            engine = %shared.name,
            worker_count,
            coalesce_window = ?shared.coalesce_window,
            "converge engine started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(handles),
            worker_count,
        })
    }

    /// Resolves `keys` as part of the next coalescing round and waits for
    /// that round to complete.
    ///
    /// Duplicate keys inside `keys` are allowed; the returned map holds one
    /// entry per distinct key.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] if the engine was stopped before the request
    ///   could be queued or drained. Nothing is queued in that case.
    /// - [`Error::Resolution`] if the resolver failed for the round. Every
    ///   caller of that round receives the same error.
    ///
    /// Must not be called from inside the engine's own resolver.
    pub async fn submit(
        &self,
        keys: Vec<K>,
    ) -> Result<HashMap<K, ResultEntry<V>>> {
        self.shared.submit(keys).await
    }

    /// Stops accepting requests and lets every worker exit after at most one
    /// final drain. Resolution calls already in flight are not interrupted.
    ///
    /// Calling it more than once has no further effect.
    pub fn stop(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!(engine = %self.shared.name, "stopping converge engine");
        }
        self.shared.shutdown.cancel();
    }

    /// [`stop`](Self::stop)s the engine and waits for all workers to exit.
    pub async fn shutdown(&self) {
        self.stop();

        let handles = std::mem::take(&mut *self.workers.lock());
        for res in join_all(handles).await {
            if let Err(e) = res {
                error!(engine = %self.shared.name, "drain worker failed: {:?}", e);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of requests queued and not yet swapped out by a worker.
    pub async fn pending_len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    pub fn stats(&self) -> ConvergeStats {
        self.shared.stats.snapshot()
    }
}

impl<K, V> Drop for Converge<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn submit(
        &self,
        keys: Vec<K>,
    ) -> Result<HashMap<K, ResultEntry<V>>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (responder, outcome_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock_priority().await;
            // Re-checked under the lock: the last exiting worker discards the
            // queue under this same lock.
            if self.shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            pending.push(PendingRequest { keys, responder });
            trace!(engine = %self.name, pending = pending.len(), "request queued");
        }
        self.stats.on_submit();

        match self.dispatch_tx.try_send(()) {
            Ok(()) => trace!("dispatch signal posted"),
            Err(TrySendError::Full(_)) => trace!("dispatch signal already pending"),
            Err(TrySendError::Closed(_)) => warn!(engine = %self.name, "dispatch channel closed"),
        }

        match outcome_rx.await {
            Ok(outcome) => outcome.map_err(Error::from),
            // Dropped without an answer: the engine stopped before draining it
            Err(_) => Err(Error::Cancelled),
        }
    }

    async fn run(
        self: Arc<Self>,
        worker_id: usize,
    ) -> Result<()> {
        let span = info_span!("converge_worker", engine = %self.name, worker = worker_id);
        self.drain_loop().instrument(span).await;
        Ok(())
    }

    async fn drain_loop(&self) {
        debug!("drain worker started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    if self.take_pending_signal().await {
                        debug!("flushing one last round before exit");
                        self.drain_round().await;
                    }
                    break;
                }

                dispatched = self.next_signal() => {
                    if !dispatched {
                        break;
                    }
                    self.drain_round().await;
                }
            }
        }

        if self.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.discard_leftovers().await;
        }
        debug!("drain worker exited");
    }

    async fn next_signal(&self) -> bool {
        self.dispatch_rx.lock().await.recv().await.is_some()
    }

    async fn take_pending_signal(&self) -> bool {
        self.dispatch_rx.lock().await.try_recv().is_ok()
    }

    /// Takes the whole pending queue, after holding the lock for the
    /// coalescing window if one is configured.
    async fn swap_pending(&self) -> Vec<PendingRequest<K, V>> {
        let mut pending = self.pending.lock().await;
        if !self.coalesce_window.is_zero() {
            tokio::time::sleep(self.coalesce_window).await;
        }
        std::mem::take(&mut *pending)
    }

    async fn drain_round(&self) {
        let batch = self.swap_pending().await;
        if batch.is_empty() {
            trace!("nothing pending, another worker drained it");
            return;
        }

        let dedup = DedupSet::collect(batch.iter().map(|r| r.keys.as_slice()));
        debug!(
            requests = batch.len(),
            unique_keys = dedup.unique.len(),
            saved_keys = dedup.saved(),
            "draining round"
        );
        if dedup.unique.is_empty() {
            // Only empty key sets were submitted, there is nothing to resolve
            for request in batch {
                request.respond(Ok(HashMap::new()));
            }
            return;
        }
        self.stats.on_round(batch.len(), dedup.unique.len(), dedup.saved());

        let DedupSet { unique, shared, .. } = dedup;
        match self.resolve(unique).await {
            Ok(resolved) => {
                for request in batch {
                    let outcome = build_outcome(&request.keys, &resolved, &shared);
                    request.respond(Ok(outcome));
                }
            }
            Err(e) => {
                warn!(requests = batch.len(), "batch resolution failed: {}", e);
                self.stats.on_resolution_error();
                for request in batch {
                    request.respond(Err(e.clone()));
                }
            }
        }
    }

    /// Runs the resolver once. A panicking resolver fails the round instead
    /// of taking the worker down.
    async fn resolve(
        &self,
        keys: Vec<K>,
    ) -> std::result::Result<HashMap<K, V>, ResolutionError> {
        match AssertUnwindSafe(self.resolver.resolve(keys)).catch_unwind().await {
            Ok(resolved) => resolved,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("batch resolver panicked: {}", message);
                Err(ResolutionError::msg(format!("batch resolver panicked: {message}")))
            }
        }
    }

    /// Called by the last worker to exit. Requests that arrived after the
    /// final drain are dropped, so their callers see `Error::Cancelled`.
    async fn discard_leftovers(&self) {
        let leftovers = std::mem::take(&mut *self.pending.lock().await);
        if !leftovers.is_empty() {
            warn!(
                requests = leftovers.len(),
                "engine stopped with undrained requests, cancelling them"
            );
        }
    }
}
