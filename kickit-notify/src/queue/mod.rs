//! In-process task queue for work that must not block the request path.
//!
//! Producers publish immutable [`TaskEnvelope`]s through [`TaskQueue`]; a
//! [`worker_pool::TaskWorkerPool`] consumes them. Nothing but the envelope
//! crosses the boundary.

pub mod push_task;
pub mod worker_pool;

pub use push_task::{PUSH_TASK_NAME, PushDeliveryTaskHandler, PushTask};
pub use worker_pool::{TaskError, TaskHandler, TaskWorkerPool, WorkerPoolConfig, WorkerPoolStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: String,
    /// Routes the envelope to a [`TaskHandler`].
    pub name: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number, set by the worker before each run.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Why a task could not be enqueued.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("task queue is full")]
    Full,

    #[error("task queue is closed")]
    Closed,

    #[error("failed to serialize task payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Producer side of the task queue. Enqueueing never waits for the task to
/// run.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<(), EnqueueError>;
}

/// Serialize `task` and enqueue it under `task_name`.
pub fn enqueue_task<T: Serialize>(
    queue: &dyn TaskQueue,
    task_name: &str,
    task: &T,
) -> Result<(), EnqueueError> {
    let payload = serde_json::to_value(task)?;
    queue.enqueue(task_name, payload)
}

/// Consumer side shared by all workers of a pool.
pub type TaskReceiver = Arc<Mutex<mpsc::Receiver<TaskEnvelope>>>;

/// [`TaskQueue`] backed by a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::Sender<TaskEnvelope>,
}

impl ChannelTaskQueue {
    /// Create a queue holding at most `capacity` pending tasks.
    pub fn bounded(capacity: usize) -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, Arc::new(Mutex::new(receiver)))
    }

    /// Number of tasks that can still be enqueued.
    pub fn available_capacity(&self) -> usize {
        self.sender.capacity()
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<(), EnqueueError> {
        let envelope = TaskEnvelope::new(task_name, payload);
        let id = envelope.id.clone();
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })?;
        trace!(task = task_name, task_id = %id, "Task enqueued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let (queue, receiver) = ChannelTaskQueue::bounded(4);
        queue.enqueue("demo", json!({"n": 1})).unwrap();

        let envelope = receiver.lock().await.recv().await.unwrap();
        assert_eq!(envelope.name, "demo");
        assert_eq!(envelope.payload, json!({"n": 1}));
        assert_eq!(envelope.attempt, 0);
        assert!(!envelope.id.is_empty());
    }

    #[test]
    fn test_full_queue_reports_full() {
        let (queue, _receiver) = ChannelTaskQueue::bounded(1);
        queue.enqueue("demo", json!(1)).unwrap();
        assert!(matches!(queue.enqueue("demo", json!(2)), Err(EnqueueError::Full)));
    }

    #[test]
    fn test_closed_queue_reports_closed() {
        let (queue, receiver) = ChannelTaskQueue::bounded(1);
        drop(receiver);
        assert!(matches!(queue.enqueue("demo", json!(1)), Err(EnqueueError::Closed)));
    }

    #[test]
    fn test_enqueue_task_serializes_payload() {
        #[derive(Serialize)]
        struct Demo {
            value: u8,
        }

        let (queue, _receiver) = ChannelTaskQueue::bounded(2);
        enqueue_task(&queue, "demo", &Demo { value: 3 }).unwrap();
        assert_eq!(queue.available_capacity(), 1);
    }
}
