//! Inbound event filtering and task derivation.
//!
//! Runs on the Socket Mode dispatch path and may be invoked concurrently
//! for distinct events. It never fetches, summarizes, or waits on reply
//! delivery: qualifying events become queued tasks and the callback returns.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::TriggerMode;
use crate::links::extract_urls;
use crate::models::event::InboundEvent;
use crate::models::task::SummaryTask;
use crate::orchestrator::queue::TaskSender;
use crate::slack::ReplySink;

/// Default reply to a mention that carries no link.
pub const DEFAULT_HELP_TEXT: &str = "\u{1f44b} Mention me with one or more links and I will \
     reply in this thread with a summary of each page.\n\
     Example: `@bot summarize https://example.com/article`";

/// What the listener did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The event did not qualify.
    Ignored,
    /// The event qualified but had no links; a help reply was dispatched.
    HelpSent,
    /// This many tasks were queued, in link order.
    Enqueued(usize),
}

/// Turns qualifying chat events into queued summary tasks.
pub struct EventListener {
    queue: TaskSender,
    replies: Arc<dyn ReplySink>,
    trigger: TriggerMode,
    bot_user_id: String,
    help_text: String,
}

impl EventListener {
    /// Create a listener feeding `queue`.
    #[must_use]
    pub fn new(
        queue: TaskSender,
        replies: Arc<dyn ReplySink>,
        trigger: TriggerMode,
        bot_user_id: impl Into<String>,
        help_text: Option<String>,
    ) -> Self {
        Self {
            queue,
            replies,
            trigger,
            bot_user_id: bot_user_id.into(),
            help_text: help_text.unwrap_or_else(|| DEFAULT_HELP_TEXT.to_owned()),
        }
    }

    /// The bot's own user id, used for mention detection.
    #[must_use]
    pub fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    /// Filter one event and queue a task per extracted link.
    pub async fn handle(&self, event: InboundEvent) -> ListenerOutcome {
        if event.from_bot || event.subtype.is_some() {
            return ListenerOutcome::Ignored;
        }
        if self.trigger == TriggerMode::Mention && !event.addressed_to_bot {
            return ListenerOutcome::Ignored;
        }

        let urls = extract_urls(&event.text);
        if urls.is_empty() {
            // Channel-watch mode stays silent on ordinary chatter.
            if !event.addressed_to_bot {
                return ListenerOutcome::Ignored;
            }
            self.spawn_help_reply(event.channel_id.clone(), event.thread_anchor().to_owned());
            return ListenerOutcome::HelpSent;
        }

        let thread_ts = event.thread_anchor().to_owned();
        let tasks: Vec<SummaryTask> = urls
            .into_iter()
            .map(|url| {
                SummaryTask::new(
                    url,
                    event.channel_id.clone(),
                    thread_ts.clone(),
                    event.message_ts.clone(),
                    event.sender_id.clone(),
                )
            })
            .collect();
        let count = tasks.len();

        match self.queue.enqueue_all(tasks) {
            Ok(seqs) => {
                info!(
                    channel = %event.channel_id,
                    count,
                    first_seq = seqs.first().copied().unwrap_or_default(),
                    "summary tasks queued"
                );
                ListenerOutcome::Enqueued(count)
            }
            Err(err) => {
                warn!(%err, channel = %event.channel_id, "could not queue summary tasks");
                ListenerOutcome::Ignored
            }
        }
    }

    /// Post the help text off the dispatch path; delivery may retry for seconds.
    fn spawn_help_reply(&self, channel_id: String, thread_ts: String) {
        let replies = Arc::clone(&self.replies);
        let text = self.help_text.clone();
        tokio::spawn(async move {
            if let Err(err) = replies.post(&channel_id, &thread_ts, &text).await {
                warn!(%err, channel = %channel_id, "failed to post help reply");
            }
        });
    }
}
