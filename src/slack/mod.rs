//! Slack bridge layer modules.
//!
//! Also defines [`ReplySink`], the outbound boundary the listener and the
//! worker post through, so neither depends on a live Slack connection.

pub mod client;
pub mod events;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Reaction shown on a message while its links are being summarized.
pub const REACTION_WORKING: &str = "hourglass_flowing_sand";

/// Reaction added to a message once a summary has been posted.
pub const REACTION_DONE: &str = "white_check_mark";

/// Outbound delivery of thread replies and progress reactions.
///
/// Failures are reported to the caller, which logs them; delivery is never
/// retried by the caller.
pub trait ReplySink: Send + Sync {
    /// Post `text` into the thread anchored at `thread_ts`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) if the message
    /// could not be delivered.
    fn post<'a>(
        &'a self,
        channel_id: &'a str,
        thread_ts: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Add reaction `name` to the message at `ts`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) on API failure.
    fn add_reaction<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove reaction `name` from the message at `ts`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) on API failure.
    fn remove_reaction<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
