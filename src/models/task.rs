//! Summary task model and its terminal outcomes.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One unit of fetch, summarize, and reply work for a single locator.
///
/// Owned by the queue until dequeued, then exclusively by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTask {
    /// Unique task identifier (UUID v4 prefixed `task:`).
    pub id: String,
    /// Queue-assigned sequence number; strictly increasing in queue order.
    pub seq: u64,
    /// Locator of the page to summarize.
    pub url: String,
    /// Channel the reply is posted to.
    pub channel_id: String,
    /// Thread the reply is posted under.
    pub thread_ts: String,
    /// Message that triggered the task, used for progress reactions.
    pub message_ts: String,
    /// User who requested the summary, when known.
    pub requested_by: Option<String>,
    /// Creation timestamp.
    pub enqueued_at: DateTime<Utc>,
}

impl SummaryTask {
    /// Construct a task with a generated identifier.
    ///
    /// The sequence number is assigned by the queue on enqueue.
    #[must_use]
    pub fn new(
        url: String,
        channel_id: String,
        thread_ts: String,
        message_ts: String,
        requested_by: Option<String>,
    ) -> Self {
        Self {
            id: format!("task:{}", Uuid::new_v4()),
            seq: 0,
            url,
            channel_id,
            thread_ts,
            message_ts,
            requested_by,
            enqueued_at: Utc::now(),
        }
    }
}

/// Why a task ended without a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The page could not be retrieved or is of an unsupported type.
    Fetch {
        /// Fetcher diagnostic.
        detail: String,
    },
    /// The page was retrieved but yielded no usable text.
    EmptyContent,
    /// The model could not be loaded or failed to produce a summary.
    Inference {
        /// Short diagnostic from the backend.
        detail: String,
    },
    /// The pipeline panicked.
    Internal,
    /// The worker stopped before reaching the task.
    ShuttingDown,
}

impl TaskFailure {
    /// Render the thread reply describing this failure.
    #[must_use]
    pub fn reply_text(&self, url: &str) -> String {
        match self {
            Self::Fetch { detail } => {
                format!("\u{26a0}\u{fe0f} Could not fetch {url}\n`{detail}`")
            }
            Self::EmptyContent => {
                format!("\u{26a0}\u{fe0f} No readable text was found at {url}")
            }
            Self::Inference { detail } => {
                format!("\u{26a0}\u{fe0f} Summarization failed for {url}\n`{detail}`")
            }
            Self::Internal => {
                format!("\u{26a0}\u{fe0f} An unexpected error occurred while summarizing {url}")
            }
            Self::ShuttingDown => format!(
                "\u{26a0}\u{fe0f} The bot is shutting down; {url} was not summarized. \
                 Mention me again to retry."
            ),
        }
    }

    /// Short machine-readable label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch_failure",
            Self::EmptyContent => "empty_content",
            Self::Inference { .. } => "inference_failure",
            Self::Internal => "internal",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl Display for TaskFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch { detail } | Self::Inference { detail } => {
                write!(f, "{}: {detail}", self.kind())
            }
            _ => f.write_str(self.kind()),
        }
    }
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A summary was generated and handed to the reply sink.
    Summarized,
    /// A failure reply was handed to the reply sink.
    Failed(TaskFailure),
}
