//! Inbound chat event as seen by the listener.

/// An immutable chat message record delivered by the transport layer.
///
/// Built once per Slack message and discarded after tasks are derived
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Timestamp identifying the message itself.
    pub message_ts: String,
    /// Parent thread timestamp when the message is a thread reply.
    pub thread_ts: Option<String>,
    /// Raw message text, including Slack link markup.
    pub text: String,
    /// Posting user, when known.
    pub sender_id: Option<String>,
    /// Whether the message mentions the bot or is a direct message to it.
    pub addressed_to_bot: bool,
    /// Whether the message was posted by a bot (including this one).
    pub from_bot: bool,
    /// Platform subtype marker (edits, joins, deletions, ...).
    pub subtype: Option<String>,
}

impl InboundEvent {
    /// Identifier tying replies to the originating conversation.
    ///
    /// Replies to a threaded message stay in that thread; replies to a
    /// top-level message start a thread under it.
    #[must_use]
    pub fn thread_anchor(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.message_ts)
    }
}
