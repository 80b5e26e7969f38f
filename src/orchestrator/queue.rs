//! Unbounded FIFO hand-off between event callbacks and the task worker.
//!
//! Any number of [`TaskSender`] clones may enqueue concurrently; exactly one
//! [`TaskReceiver`] drains. Sequence numbers are stamped under the same lock
//! that performs the send, so queue order and sequence order always agree
//! and the tasks of one event stay contiguous.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::task::SummaryTask;
use crate::{AppError, Result};

/// Result of a bounded wait on the queue.
#[derive(Debug)]
pub enum Dequeued {
    /// The next task in arrival order.
    Task(SummaryTask),
    /// Nothing arrived within the timeout.
    Empty,
    /// All senders are gone or the queue was closed, and it is drained.
    Closed,
}

struct SenderState {
    tx: mpsc::UnboundedSender<SummaryTask>,
    next_seq: u64,
}

/// Producer handle; cheap to clone and safe to use from many callbacks.
#[derive(Clone)]
pub struct TaskSender {
    state: Arc<Mutex<SenderState>>,
}

/// Single consumer handle owned by the task worker.
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<SummaryTask>,
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn task_queue() -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TaskSender {
            state: Arc::new(Mutex::new(SenderState { tx, next_seq: 1 })),
        },
        TaskReceiver { rx },
    )
}

impl TaskSender {
    /// Enqueue one task, returning its sequence number. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the worker has shut the queue.
    pub fn enqueue(&self, task: SummaryTask) -> Result<u64> {
        self.enqueue_all(vec![task])
            .map(|seqs| seqs.first().copied().unwrap_or_default())
    }

    /// Enqueue a batch atomically with respect to other producers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the worker has shut the queue; tasks
    /// sent before the failure remain queued.
    pub fn enqueue_all(&self, tasks: Vec<SummaryTask>) -> Result<Vec<u64>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seqs = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            let seq = state.next_seq;
            task.seq = seq;
            state
                .tx
                .send(task)
                .map_err(|_| AppError::Queue("task queue is closed".into()))?;
            state.next_seq += 1;
            seqs.push(seq);
        }
        debug!(count = seqs.len(), "tasks enqueued");
        Ok(seqs)
    }
}

impl TaskReceiver {
    /// Wait up to `timeout` for the next task.
    pub async fn dequeue(&mut self, timeout: Duration) -> Dequeued {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(task)) => Dequeued::Task(task),
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::Empty,
        }
    }

    /// Refuse further enqueues. Tasks already queued stay receivable.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Take every task currently queued without waiting.
    pub fn drain_pending(&mut self) -> Vec<SummaryTask> {
        let mut pending = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            pending.push(task);
        }
        pending
    }
}
