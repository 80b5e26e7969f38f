//! Single-consumer task worker.
//!
//! Drains the task queue strictly in arrival order and runs each task's
//! fetch, summarize, and reply pipeline to a terminal outcome before taking
//! the next one. The worker is the only owner of the [`ModelManager`]:
//! the model is loaded on the first task of a burst that needs it and
//! released once the queue has stayed empty for the drain threshold.
//!
//! ```text
//! Idle ──task──▶ Processing ──first fetch ok──▶ Acquiring ──▶ Processing
//!                    ▲   │ queue empty                           │
//!                    │   ▼                                       │
//!                 task  Draining ──idle ≥ drain_after──▶ Releasing ──▶ Idle
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::fetch::ContentFetcher;
use crate::inference::{InferenceBackend, ModelManager};
use crate::models::task::{SummaryTask, TaskFailure, TaskOutcome};
use crate::orchestrator::queue::{Dequeued, TaskReceiver};
use crate::slack::{ReplySink, REACTION_DONE, REACTION_WORKING};
use crate::summarize::Summarizer;

/// Lifecycle phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No model held; waiting for work.
    Idle,
    /// Loading the model for the first task of a burst.
    Acquiring,
    /// Running a task's pipeline.
    Processing,
    /// Model held, queue empty, waiting out the drain threshold.
    Draining,
    /// Unloading the model.
    Releasing,
}

/// Timing and sizing knobs for the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Upper bound on one queue wait.
    pub poll_interval: Duration,
    /// Idle time after the last task before the model is released.
    pub drain_after: Duration,
    /// Maximum characters of page text handed to the model.
    pub max_text_length: usize,
}

impl WorkerSettings {
    /// Derive settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            poll_interval: config.worker.poll_interval(),
            drain_after: config.worker.drain_after(),
            max_text_length: config.fetch.max_text_length,
        }
    }
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks that ended with a summary.
    pub summarized: u64,
    /// Tasks that ended with a failure reply.
    pub failed: u64,
    /// Tasks answered with a shutdown notice instead of being run.
    pub abandoned: u64,
}

/// The single consumer of the task queue.
pub struct TaskWorker<B: InferenceBackend> {
    queue: TaskReceiver,
    models: ModelManager<B>,
    fetcher: Arc<dyn ContentFetcher>,
    summarizer: Summarizer,
    replies: Arc<dyn ReplySink>,
    settings: WorkerSettings,
    state: WorkerState,
    last_finished: Option<Instant>,
    stats: WorkerStats,
}

impl<B: InferenceBackend + 'static> TaskWorker<B> {
    /// Assemble a worker; nothing runs until [`run`](Self::run) or
    /// [`spawn`](Self::spawn).
    #[must_use]
    pub fn new(
        queue: TaskReceiver,
        models: ModelManager<B>,
        fetcher: Arc<dyn ContentFetcher>,
        summarizer: Summarizer,
        replies: Arc<dyn ReplySink>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            models,
            fetcher,
            summarizer,
            replies,
            settings,
            state: WorkerState::Idle,
            last_finished: None,
            stats: WorkerStats::default(),
        }
    }

    /// Run the worker on its own task until `cancel` fires or the queue closes.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run(cancel).instrument(info_span!("task_worker")))
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The model manager this worker owns.
    #[must_use]
    pub fn models(&self) -> &ModelManager<B> {
        &self.models
    }

    /// Drive the worker loop.
    ///
    /// Cancellation is only observed between tasks: an in-flight task always
    /// reaches its terminal outcome first. On exit, tasks still queued get a
    /// shutdown notice and the model is released.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerStats {
        info!(
            poll_ms = u64::try_from(self.settings.poll_interval.as_millis()).unwrap_or(u64::MAX),
            drain_after_secs = self.settings.drain_after.as_secs(),
            "task worker started"
        );

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("task worker cancelled");
                    break;
                }
                next = self.queue.dequeue(self.settings.poll_interval) => next,
            };

            match next {
                Dequeued::Task(task) => {
                    self.process(&task).await;
                }
                Dequeued::Empty => self.on_empty_poll().await,
                Dequeued::Closed => {
                    info!("task queue closed");
                    break;
                }
            }
        }

        self.shutdown().await;
        info!(
            summarized = self.stats.summarized,
            failed = self.stats.failed,
            abandoned = self.stats.abandoned,
            "task worker stopped"
        );
        self.stats
    }

    /// Run one task to its terminal outcome.
    pub async fn process(&mut self, task: &SummaryTask) -> TaskOutcome {
        let span = info_span!("summary_task", task_id = %task.id, seq = task.seq, url = %task.url);
        let outcome = self.process_inner(task).instrument(span).await;
        match outcome {
            TaskOutcome::Summarized => self.stats.summarized += 1,
            TaskOutcome::Failed(_) => self.stats.failed += 1,
        }
        self.last_finished = Some(Instant::now());
        outcome
    }

    async fn process_inner(&mut self, task: &SummaryTask) -> TaskOutcome {
        self.state = WorkerState::Processing;
        self.acknowledge(task).await;

        let result = match AssertUnwindSafe(self.execute(task)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("task pipeline panicked");
                Err(TaskFailure::Internal)
            }
        };
        self.state = WorkerState::Processing;

        let outcome = match result {
            Ok(summary) => {
                self.deliver(task, &summary).await;
                info!("summary posted");
                TaskOutcome::Summarized
            }
            Err(failure) => {
                warn!(kind = failure.kind(), %failure, "summary task failed");
                self.deliver(task, &failure.reply_text(&task.url)).await;
                TaskOutcome::Failed(failure)
            }
        };

        self.settle_reactions(task, matches!(outcome, TaskOutcome::Summarized))
            .await;
        outcome
    }

    /// Fetch, load the model if needed, and summarize.
    async fn execute(&mut self, task: &SummaryTask) -> Result<String, TaskFailure> {
        let page = self
            .fetcher
            .fetch(&task.url, self.settings.max_text_length)
            .await
            .map_err(|err| TaskFailure::Fetch {
                detail: err.detail().to_owned(),
            })?;

        if page.is_blank() {
            return Err(TaskFailure::EmptyContent);
        }

        if !self.models.is_loaded() {
            self.state = WorkerState::Acquiring;
        }
        self.models
            .acquire()
            .await
            .map_err(|err| TaskFailure::Inference {
                detail: err.detail().to_owned(),
            })?;
        self.state = WorkerState::Processing;

        let (backend, handle) = self.models.loaded().ok_or_else(|| TaskFailure::Inference {
            detail: "model was not loaded".into(),
        })?;

        self.summarizer
            .summarize(backend, handle, &page)
            .await
            .map_err(|err| TaskFailure::Inference {
                detail: err.detail().to_owned(),
            })
    }

    /// Release the model once the queue has been quiet long enough.
    async fn on_empty_poll(&mut self) {
        if !self.models.is_loaded() {
            self.state = WorkerState::Idle;
            return;
        }

        self.state = WorkerState::Draining;
        let quiet_since = *self.last_finished.get_or_insert_with(Instant::now);
        if quiet_since.elapsed() < self.settings.drain_after {
            return;
        }

        debug!("burst drained");
        self.release_model().await;
    }

    async fn release_model(&mut self) {
        self.state = WorkerState::Releasing;
        if let Err(err) = self.models.release().await {
            error!(%err, "failed to release summarization model");
        }
        self.last_finished = None;
        self.state = WorkerState::Idle;
    }

    async fn shutdown(&mut self) {
        self.queue.close();
        for task in self.queue.drain_pending() {
            info!(task_id = %task.id, seq = task.seq, "answering queued task with shutdown notice");
            let text = TaskFailure::ShuttingDown.reply_text(&task.url);
            self.deliver(&task, &text).await;
            self.stats.abandoned += 1;
        }
        self.release_model().await;
    }

    async fn acknowledge(&self, task: &SummaryTask) {
        if let Err(err) = self
            .replies
            .add_reaction(&task.channel_id, &task.message_ts, REACTION_WORKING)
            .await
        {
            debug!(%err, "failed to add working reaction");
        }
        let text = format!("\u{23f3} Summarizing {}\u{2026}", task.url);
        self.deliver(task, &text).await;
    }

    async fn deliver(&self, task: &SummaryTask, text: &str) {
        if let Err(err) = self
            .replies
            .post(&task.channel_id, &task.thread_ts, text)
            .await
        {
            error!(%err, task_id = %task.id, "reply delivery failed");
        }
    }

    async fn settle_reactions(&self, task: &SummaryTask, succeeded: bool) {
        if let Err(err) = self
            .replies
            .remove_reaction(&task.channel_id, &task.message_ts, REACTION_WORKING)
            .await
        {
            debug!(%err, "failed to remove working reaction");
        }
        if succeeded {
            if let Err(err) = self
                .replies
                .add_reaction(&task.channel_id, &task.message_ts, REACTION_DONE)
                .await
            {
                debug!(%err, "failed to add done reaction");
            }
        }
    }
}
