//! Worker pool consuming the in-process task queue.

use async_trait::async_trait;
use rand::random;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{TaskEnvelope, TaskReceiver};

/// Failure reported by a [`TaskHandler`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Worth another attempt (credential refresh, network).
    #[error("retryable: {0}")]
    Retryable(String),

    /// Another attempt would fail the same way.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Executes tasks of one name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_name(&self) -> &'static str;

    /// Run one attempt. Handlers must be cancel-safe: the pool drops the
    /// future when the per-task timeout elapses.
    async fn handle(&self, envelope: &TaskEnvelope) -> Result<(), TaskError>;
}

/// Configuration for a worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent workers.
    pub max_workers: usize,
    /// Per-attempt timeout in seconds.
    pub task_timeout_secs: u64,
    /// Attempts per task, including the first. 1 disables retries.
    pub max_attempts: u32,
    /// Base delay before the second attempt; doubles per attempt.
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            task_timeout_secs: 30,
            max_attempts: 1,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl WorkerPoolConfig {
    /// Delay before attempt `attempt + 1`, with up to 25% jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.retry_max_delay_ms);
        let jitter = random::<u64>() % (capped / 4 + 1);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of what a pool has processed since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    /// Envelopes discarded because a drain did not finish in time.
    pub dropped: u64,
}

/// A pool of workers draining a [`TaskReceiver`].
///
/// Shutdown is a drain: the receiver is closed so no new tasks are accepted,
/// and every envelope already queued still runs. Only
/// [`TaskWorkerPool::stop_with_timeout`] discards work, and only once its
/// deadline passes.
pub struct TaskWorkerPool {
    config: WorkerPoolConfig,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Graceful stop: close the receiver and finish queued work.
    drain_token: CancellationToken,
    /// Hard stop: workers exit without taking more work.
    cancellation_token: CancellationToken,
    counters: Arc<PoolCounters>,
    receiver: parking_lot::Mutex<Option<TaskReceiver>>,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl TaskWorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            config: WorkerPoolConfig {
                max_workers,
                max_attempts: config.max_attempts.max(1),
                ..config
            },
            drain_token: CancellationToken::new(),
            cancellation_token: CancellationToken::new(),
            counters: Arc::new(PoolCounters::default()),
            receiver: parking_lot::Mutex::new(None),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the workers. Each envelope is routed to the handler whose
    /// `task_name` matches.
    pub fn start(&self, receiver: TaskReceiver, handlers: Vec<Arc<dyn TaskHandler>>) {
        info!(
            max_workers = self.config.max_workers,
            max_attempts = self.config.max_attempts,
            "Starting task worker pool"
        );

        let handlers = Arc::new(handlers);
        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Task worker pool already stopped; not starting");
            return;
        };
        *self.receiver.lock() = Some(receiver.clone());

        for worker_id in 0..self.config.max_workers {
            let receiver = receiver.clone();
            let handlers = handlers.clone();
            let semaphore = self.semaphore.clone();
            let drain_token = self.drain_token.clone();
            let cancellation_token = self.cancellation_token.clone();
            let counters = self.counters.clone();
            let config = self.config.clone();

            join_set.spawn(async move {
                debug!(worker_id, "Task worker started");

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancellation_token.cancelled() => break,
                        _ = drain_token.cancelled() => {
                            // After close(), recv() yields the buffered
                            // envelopes and then None without waiting.
                            let mut rx = receiver.lock().await;
                            rx.close();
                            rx.recv().await
                        }
                        next = async { receiver.lock().await.recv().await } => next,
                    };
                    let Some(envelope) = next else {
                        break;
                    };

                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };

                    match handlers.iter().find(|h| h.task_name() == envelope.name) {
                        Some(handler) => {
                            run_task(handler.as_ref(), envelope, &config, &counters).await;
                        }
                        None => {
                            warn!(
                                task = %envelope.name,
                                task_id = %envelope.id,
                                "No handler registered for task; dropping"
                            );
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    drop(permit);
                }

                debug!(worker_id, "Task worker stopped");
            });
        }
    }

    /// Stop accepting work and wait until every queued task has run.
    pub async fn stop(&self) {
        info!("Stopping task worker pool; draining queued tasks");
        self.drain_token.cancel();

        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Task worker pool stopped");
    }

    /// [`TaskWorkerPool::stop`] bounded by `timeout`. When the drain does not
    /// finish in time the workers are aborted and whatever is still queued is
    /// discarded and counted as dropped. Returns whether the drain completed.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.stop()).await.is_ok() {
            return true;
        }

        // The JoinSet was dropped with the timed-out future, aborting workers.
        self.cancellation_token.cancel();
        let dropped = self.discard_pending().await;
        warn!(
            ?timeout,
            dropped,
            "Task worker pool drain timed out; queued tasks dropped"
        );
        false
    }

    async fn discard_pending(&self) -> u64 {
        let receiver = self.receiver.lock().clone();
        let Some(receiver) = receiver else {
            return 0;
        };

        let mut rx = receiver.lock().await;
        rx.close();
        let mut dropped = 0;
        while let Ok(envelope) = rx.try_recv() {
            debug!(task = %envelope.name, task_id = %envelope.id, "Dropping queued task");
            dropped += 1;
        }
        self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
        dropped
    }

    pub fn is_running(&self) -> bool {
        !self.drain_token.is_cancelled() && !self.cancellation_token.is_cancelled()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

async fn run_task(
    handler: &dyn TaskHandler,
    mut envelope: TaskEnvelope,
    config: &WorkerPoolConfig,
    counters: &PoolCounters,
) {
    let timeout = Duration::from_secs(config.task_timeout_secs);

    for attempt in 1..=config.max_attempts {
        envelope.attempt = attempt;

        let error = match tokio::time::timeout(timeout, handler.handle(&envelope)).await {
            Ok(Ok(())) => {
                debug!(task = %envelope.name, task_id = %envelope.id, attempt, "Task completed");
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(e)) => e,
            Err(_) => TaskError::Retryable(format!("timed out after {:?}", timeout)),
        };

        if !error.is_retryable() || attempt == config.max_attempts {
            warn!(
                task = %envelope.name,
                task_id = %envelope.id,
                attempt,
                error = %error,
                "Task failed"
            );
            counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let delay = config.retry_delay(attempt);
        debug!(
            task = %envelope.name,
            task_id = %envelope.id,
            attempt,
            ?delay,
            error = %error,
            "Task failed; retrying"
        );
        counters.retried.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ChannelTaskQueue, TaskQueue};
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct FlakyHandler {
        calls: AtomicU32,
        fail_times: u32,
        fatal: bool,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        fn task_name(&self) -> &'static str {
            "flaky"
        }

        async fn handle(&self, envelope: &TaskEnvelope) -> Result<(), TaskError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(envelope.attempt, call);
            if call <= self.fail_times {
                if self.fatal {
                    return Err(TaskError::Fatal("bad payload".into()));
                }
                return Err(TaskError::Retryable("try again".into()));
            }
            Ok(())
        }
    }

    fn fast_config(max_attempts: u32) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_workers: 2,
            task_timeout_secs: 5,
            max_attempts,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.task_timeout_secs, 30);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_retry_delay_grows_and_is_capped() {
        let config = WorkerPoolConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1_000,
            ..WorkerPoolConfig::default()
        };
        assert!(config.retry_delay(1) >= Duration::from_millis(100));
        assert!(config.retry_delay(1) <= Duration::from_millis(125));
        assert!(config.retry_delay(2) >= Duration::from_millis(200));
        assert!(config.retry_delay(30) <= Duration::from_millis(1_250));
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let (queue, receiver) = ChannelTaskQueue::bounded(8);
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_times: 2,
            fatal: false,
        });
        let pool = TaskWorkerPool::new(fast_config(3));
        pool.start(receiver, vec![handler.clone()]);

        queue.enqueue("flaky", json!({})).unwrap();
        wait_for(|| pool.stats().succeeded == 1).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(pool.stats().retried, 2);
        pool.stop().await;
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let (queue, receiver) = ChannelTaskQueue::bounded(8);
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_times: 5,
            fatal: true,
        });
        let pool = TaskWorkerPool::new(fast_config(3));
        pool.start(receiver, vec![handler.clone()]);

        queue.enqueue("flaky", json!({})).unwrap();
        wait_for(|| pool.stats().failed == 1).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let (queue, receiver) = ChannelTaskQueue::bounded(8);
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_times: 1,
            fatal: false,
        });
        let pool = TaskWorkerPool::new(fast_config(1));
        pool.start(receiver, vec![handler.clone()]);

        queue.enqueue("flaky", json!({})).unwrap();
        wait_for(|| pool.stats().failed == 1).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_task_is_dropped() {
        let (queue, receiver) = ChannelTaskQueue::bounded(8);
        let pool = TaskWorkerPool::new(fast_config(1));
        pool.start(receiver, Vec::new());

        queue.enqueue("nobody", json!(null)).unwrap();
        wait_for(|| pool.stats().failed == 1).await;
        pool.stop().await;
    }

    struct SlowHandler {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for SlowHandler {
        fn task_name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _envelope: &TaskEnvelope) -> Result<(), TaskError> {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn single_worker() -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_workers: 1,
            ..fast_config(1)
        }
    }

    #[tokio::test]
    async fn test_stop_drains_queued_tasks() {
        let (queue, receiver) = ChannelTaskQueue::bounded(16);
        let handler = Arc::new(SlowHandler {
            delay: Duration::from_millis(30),
            calls: AtomicU32::new(0),
        });
        let pool = TaskWorkerPool::new(single_worker());
        pool.start(receiver, vec![handler.clone()]);

        for _ in 0..5 {
            queue.enqueue("slow", json!({})).unwrap();
        }
        pool.stop().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        let stats = pool.stats();
        assert_eq!(stats.succeeded + stats.failed, 5);
        assert_eq!(stats.dropped, 0);
        assert!(!pool.is_running());
        // The receiver is closed once draining starts.
        assert!(matches!(
            queue.enqueue("slow", json!({})),
            Err(crate::queue::EnqueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_stop_on_idle_pool_returns() {
        let (_queue, receiver) = ChannelTaskQueue::bounded(4);
        let pool = TaskWorkerPool::new(fast_config(1));
        pool.start(receiver, Vec::new());

        assert!(pool.stop_with_timeout(Duration::from_secs(5)).await);
        assert_eq!(pool.stats(), WorkerPoolStats::default());
    }

    #[tokio::test]
    async fn test_stop_with_timeout_counts_dropped_tasks() {
        let (queue, receiver) = ChannelTaskQueue::bounded(16);
        let handler = Arc::new(SlowHandler {
            delay: Duration::from_secs(5),
            calls: AtomicU32::new(0),
        });
        let pool = TaskWorkerPool::new(WorkerPoolConfig {
            task_timeout_secs: 30,
            ..single_worker()
        });
        pool.start(receiver, vec![handler.clone()]);

        for _ in 0..3 {
            queue.enqueue("slow", json!({})).unwrap();
        }
        // Let the worker pick up the first envelope.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!pool.stop_with_timeout(Duration::from_millis(50)).await);

        let stats = pool.stats();
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.dropped, 2);
        assert!(queue.enqueue("slow", json!({})).is_err());
    }
}
