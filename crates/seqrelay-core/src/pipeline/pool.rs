//! Bounded-concurrency worker pool for one stage.
//!
//! Items are queued on a bounded tokio MPSC channel. A dispatcher task pulls
//! from the queue and runs each item on its own task while holding one of
//! `workers` semaphore slots, so at most `workers` items are processed at
//! once and a slow item never holds up the others. Completion order is
//! whatever order the work finishes in; ordering is restored downstream.
//!
//! Every accepted item produces exactly one terminal signal on the pool's
//! output, including when the stage panics or is aborted at shutdown.
//!
//! # Shutdown
//!
//! [`StageWorkerPool::shutdown`] stops intake and lets queued and running
//! items finish for up to the drain timeout. Past that, running workers are
//! aborted and every item they held, plus anything still queued, is failed
//! on the output, so shutdown always returns.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use seqrelay_types::config::StageConfig;
use seqrelay_types::error::{RelayError, Result};
use seqrelay_types::sequence::{FailureReason, SequenceNumber};

use super::traits::{Stage, StageOutput};

type Job<I> = (SequenceNumber, I);

/// How long `shutdown` waits for in-flight work before aborting it.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const ABORTED: &str = "aborted at shutdown";

#[derive(Debug, Default)]
struct PoolCounters {
    accepted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    in_progress: AtomicUsize,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Stage name.
    pub stage: String,
    /// Configured concurrency.
    pub workers: usize,
    /// Items accepted by `submit`.
    pub accepted: u64,
    /// Items whose stage returned a result.
    pub succeeded: u64,
    /// Items whose stage returned an error or panicked.
    pub failed: u64,
    /// Of `failed`, how many panicked.
    pub panicked: u64,
    /// Items currently being processed.
    pub in_progress: usize,
}

/// Worker pool running one [`Stage`] and reporting to a [`StageOutput`].
pub struct StageWorkerPool<I, O> {
    name: Arc<str>,
    workers: usize,
    intake: Mutex<Option<mpsc::Sender<Job<I>>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    output: Arc<dyn StageOutput<O>>,
    counters: Arc<PoolCounters>,
    abort: CancellationToken,
    drain_timeout: Duration,
}

impl<I: Send + 'static, O: Send + 'static> StageWorkerPool<I, O> {
    /// Start a pool with `workers` concurrent slots and an intake queue of
    /// `queue_capacity` items.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        stage: Arc<dyn Stage<I, O>>,
        workers: usize,
        queue_capacity: usize,
        output: Arc<dyn StageOutput<O>>,
    ) -> Self {
        let workers = workers.max(1);
        let name: Arc<str> = Arc::from(stage.name());
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let counters = Arc::new(PoolCounters::default());
        let abort = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&name),
            rx,
            stage,
            Arc::clone(&output),
            workers,
            Arc::clone(&counters),
            abort.clone(),
        ));
        info!(stage = %name, workers, queue_capacity, "stage worker pool started");

        Self {
            name,
            workers,
            intake: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            output,
            counters,
            abort,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Set how long [`shutdown`](Self::shutdown) waits before aborting.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Start a pool sized from a [`StageConfig`]; an unset queue capacity
    /// falls back to `window`.
    pub fn from_config(
        stage: Arc<dyn Stage<I, O>>,
        config: &StageConfig,
        window: usize,
        output: Arc<dyn StageOutput<O>>,
    ) -> Self {
        Self::spawn(
            stage,
            config.workers,
            config.queue_capacity_or(window),
            output,
        )
    }

    /// Queue `input` for processing as item `seq`.
    ///
    /// Waits while the intake queue is full. Fails with
    /// [`RelayError::Closed`] after shutdown; the caller then still owns the
    /// obligation to signal `seq`.
    pub async fn submit(&self, seq: SequenceNumber, input: I) -> Result<()> {
        let tx = self.intake.lock().clone().ok_or(RelayError::Closed)?;
        tx.send((seq, input))
            .await
            .map_err(|_| RelayError::Closed)?;
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(stage = %self.name, seq, "item queued");
        Ok(())
    }

    /// Stop intake and wait until every accepted item has signalled.
    ///
    /// Workers still running after the drain timeout are aborted and their
    /// items failed with an "aborted at shutdown" reason.
    pub async fn shutdown(&self) {
        drop(self.intake.lock().take());
        let handle = self.dispatcher.lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        let joined = match tokio::time::timeout(self.drain_timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    stage = %self.name,
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    in_progress = self.counters.in_progress.load(Ordering::Relaxed),
                    "drain timed out, aborting remaining workers"
                );
                self.abort.cancel();
                handle.await
            }
        };
        if let Err(e) = joined {
            error!(stage = %self.name, error = %e, "dispatcher task ended abnormally");
        }
        info!(stage = %self.name, "stage worker pool stopped");
    }

    /// Configured drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            stage: self.name.to_string(),
            workers: self.workers,
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            in_progress: self.counters.in_progress.load(Ordering::Relaxed),
        }
    }
}

/// A pool is itself a stage output: a result from the previous stage becomes
/// this stage's input, and failures pass through untouched.
#[async_trait]
impl<I: Send + 'static, O: Send + 'static> StageOutput<I> for StageWorkerPool<I, O> {
    async fn emit(&self, seq: SequenceNumber, value: I) {
        if let Err(e) = self.submit(seq, value).await {
            warn!(stage = %self.name, seq, error = %e, "could not queue item, failing it");
            self.output
                .emit_failure(seq, FailureReason::stage(self.name.as_ref(), e.to_string()))
                .await;
        }
    }

    async fn emit_failure(&self, seq: SequenceNumber, reason: FailureReason) {
        self.output.emit_failure(seq, reason).await;
    }

    async fn close(&self) {
        self.shutdown().await;
        self.output.close().await;
    }
}

async fn dispatch<I: Send + 'static, O: Send + 'static>(
    name: Arc<str>,
    mut rx: mpsc::Receiver<Job<I>>,
    stage: Arc<dyn Stage<I, O>>,
    output: Arc<dyn StageOutput<O>>,
    workers: usize,
    counters: Arc<PoolCounters>,
    abort: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(workers));
    let active = Arc::new(Mutex::new(HashSet::new()));
    let mut running = JoinSet::new();
    let mut stranded = Vec::new();

    loop {
        let job = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            job = rx.recv() => job,
        };
        let Some((seq, input)) = job else {
            break;
        };
        let slot = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            slot = Arc::clone(&slots).acquire_owned() => slot.ok(),
        };
        let Some(slot) = slot else {
            stranded.push(seq);
            break;
        };
        counters.in_progress.fetch_add(1, Ordering::Relaxed);
        active.lock().insert(seq);
        running.spawn(run_item(
            Arc::clone(&name),
            seq,
            input,
            Arc::clone(&stage),
            Arc::clone(&output),
            Arc::clone(&counters),
            Arc::clone(&active),
            slot,
        ));
        while let Some(joined) = running.try_join_next() {
            log_join(&name, joined);
        }
    }

    let mut aborted = abort.is_cancelled();
    if aborted {
        running.abort_all();
    }
    loop {
        tokio::select! {
            biased;
            _ = abort.cancelled(), if !aborted => {
                running.abort_all();
                aborted = true;
            }
            joined = running.join_next() => match joined {
                Some(joined) => log_join(&name, joined),
                None => break,
            },
        }
    }

    if aborted {
        rx.close();
        while let Ok((seq, _)) = rx.try_recv() {
            stranded.push(seq);
        }
        counters.in_progress.store(0, Ordering::Relaxed);
        let mut abandoned: Vec<_> = active.lock().drain().collect();
        abandoned.append(&mut stranded);
        abandoned.sort_unstable();
        for seq in abandoned {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(stage = %name, seq, "in-flight item failed at shutdown");
            output
                .emit_failure(seq, FailureReason::stage(name.as_ref(), ABORTED))
                .await;
        }
    }
    debug!(stage = %name, aborted, "dispatcher drained");
}

#[allow(clippy::too_many_arguments)]
async fn run_item<I: Send + 'static, O: Send + 'static>(
    name: Arc<str>,
    seq: SequenceNumber,
    input: I,
    stage: Arc<dyn Stage<I, O>>,
    output: Arc<dyn StageOutput<O>>,
    counters: Arc<PoolCounters>,
    active: Arc<Mutex<HashSet<SequenceNumber>>>,
    _slot: OwnedSemaphorePermit,
) {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(stage.process(seq, input))
        .catch_unwind()
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    counters.in_progress.fetch_sub(1, Ordering::Relaxed);

    match outcome {
        Ok(Ok(value)) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            debug!(stage = %name, seq, elapsed_ms, "item processed");
            output.emit(seq, value).await;
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let reason = FailureReason::stage(name.as_ref(), e.to_string());
            warn!(seq, elapsed_ms, error = %reason.to_error(seq), "stage failed item");
            output.emit_failure(seq, reason).await;
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            let reason = FailureReason::stage(name.as_ref(), "stage panicked");
            error!(seq, error = %reason.to_error(seq), "stage panicked while processing item");
            output.emit_failure(seq, reason).await;
        }
    }
    active.lock().remove(&seq);
}

fn log_join(name: &str, joined: std::result::Result<(), tokio::task::JoinError>) {
    match joined {
        Err(e) if e.is_cancelled() => debug!(stage = %name, "worker task aborted"),
        Err(e) => error!(stage = %name, error = %e, "worker task ended abnormally"),
        Ok(()) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use seqrelay_types::error::StageError;

    /// Records every signal it receives.
    #[derive(Default)]
    struct Recorder {
        results: Mutex<Vec<(SequenceNumber, String)>>,
        failures: Mutex<Vec<(SequenceNumber, FailureReason)>>,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl StageOutput<String> for Recorder {
        async fn emit(&self, seq: SequenceNumber, value: String) {
            self.results.lock().push((seq, value));
        }

        async fn emit_failure(&self, seq: SequenceNumber, reason: FailureReason) {
            self.failures.lock().push((seq, reason));
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sleeps for the per-item delay, then echoes; panics or fails on demand.
    struct Scripted {
        delays: HashMap<SequenceNumber, u64>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new(delays: &[(SequenceNumber, u64)]) -> Self {
            Self {
                delays: delays.iter().copied().collect(),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Stage<String, String> for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn process(&self, seq: SequenceNumber, input: String) -> std::result::Result<String, StageError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(&seq).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            match input.as_str() {
                "panic" => panic!("scripted panic"),
                "fail" => Err(StageError::Processing("scripted failure".into())),
                _ => Ok(format!("{input}!")),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completions_arrive_in_finish_order() {
        let recorder = Arc::new(Recorder::default());
        let stage = Arc::new(Scripted::new(&[(1, 300), (2, 100), (3, 200)]));
        let pool = StageWorkerPool::<String, String>::spawn(stage, 3, 8, recorder.clone());

        for seq in 1..=3 {
            pool.submit(seq, format!("item{seq}")).await.unwrap();
        }
        pool.shutdown().await;

        let order: Vec<_> = recorder.results.lock().iter().map(|(s, _)| *s).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(pool.stats().succeeded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let recorder = Arc::new(Recorder::default());
        let delays: Vec<_> = (1..=10).map(|s| (s, 50)).collect();
        let stage = Arc::new(Scripted::new(&delays));
        let pool = StageWorkerPool::<String, String>::spawn(stage.clone(), 2, 16, recorder.clone());

        for seq in 1..=10 {
            pool.submit(seq, "x".into()).await.unwrap();
        }
        pool.shutdown().await;

        assert_eq!(recorder.results.lock().len(), 10);
        assert_eq!(stage.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_and_panic_each_signal_once() {
        let recorder = Arc::new(Recorder::default());
        let stage = Arc::new(Scripted::new(&[]));
        let pool = StageWorkerPool::<String, String>::spawn(stage, 2, 8, recorder.clone());

        pool.submit(1, "ok".into()).await.unwrap();
        pool.submit(2, "fail".into()).await.unwrap();
        pool.submit(3, "panic".into()).await.unwrap();
        pool.shutdown().await;

        assert_eq!(recorder.results.lock().clone(), vec![(1, "ok!".to_string())]);
        let mut failures = recorder.failures.lock().clone();
        failures.sort_by_key(|(s, _)| *s);
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0],
            (2, FailureReason::stage("scripted", "processing failed: scripted failure"))
        );
        assert_eq!(failures[1], (3, FailureReason::stage("scripted", "stage panicked")));

        let stats = pool.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.in_progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_hung_worker_and_fails_queued_items() {
        let recorder = Arc::new(Recorder::default());
        let stage = Arc::new(Scripted::new(&[(1, 3_600_000)]));
        let pool = StageWorkerPool::<String, String>::spawn(stage, 1, 4, recorder.clone())
            .with_drain_timeout(Duration::from_secs(1));
        let start = Instant::now();

        pool.submit(1, "stuck".into()).await.unwrap();
        pool.submit(2, "waiting".into()).await.unwrap();
        pool.shutdown().await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(recorder.results.lock().is_empty());
        let mut failures = recorder.failures.lock().clone();
        failures.sort_by_key(|(s, _)| *s);
        let aborted = FailureReason::stage("scripted", "aborted at shutdown");
        assert_eq!(failures, vec![(1, aborted.clone()), (2, aborted)]);

        let stats = pool.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.in_progress, 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_closed() {
        let recorder = Arc::new(Recorder::default());
        let pool = StageWorkerPool::<String, String>::spawn(Arc::new(Scripted::new(&[])), 1, 1, recorder.clone());
        pool.shutdown().await;
        assert!(matches!(pool.submit(1, "x".into()).await, Err(RelayError::Closed)));
    }

    #[tokio::test]
    async fn pool_as_output_fails_items_it_cannot_queue() {
        let recorder = Arc::new(Recorder::default());
        let pool = StageWorkerPool::<String, String>::spawn(Arc::new(Scripted::new(&[])), 1, 1, recorder.clone());
        pool.shutdown().await;

        pool.emit(4, "late".into()).await;
        pool.emit_failure(5, FailureReason::Timeout).await;

        let failures = recorder.failures.lock().clone();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, 4);
        assert_eq!(failures[1], (5, FailureReason::Timeout));
    }

    #[tokio::test]
    async fn close_cascades_to_output() {
        let recorder = Arc::new(Recorder::default());
        let pool = StageWorkerPool::<String, String>::spawn(Arc::new(Scripted::new(&[])), 1, 4, recorder.clone());
        pool.submit(1, "a".into()).await.unwrap();
        StageOutput::close(&pool).await;
        assert_eq!(recorder.results.lock().len(), 1);
        assert_eq!(recorder.closed.load(Ordering::Relaxed), 1);
    }
}
