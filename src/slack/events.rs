//! Socket Mode push event dispatch.
//!
//! Converts Slack message events into [`InboundEvent`]s and hands them to
//! the [`EventListener`]. The callback runs on the Socket Mode dispatch
//! path, so it only extracts links and enqueues; all slow work happens on
//! the task worker.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackMessageEvent, SlackPushEventCallback,
};
use tracing::{debug, warn};

use crate::models::event::InboundEvent;
use crate::orchestrator::listener::EventListener;

/// Handle push events delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; problems are logged so Slack still receives its ack.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let listener: Option<Arc<EventListener>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<EventListener>>().cloned()
    };

    let Some(listener) = listener else {
        warn!("event listener not available; dropping push event");
        return Ok(());
    };

    match &event.event {
        SlackEventCallbackBody::Message(message) => {
            if let Some(inbound) = inbound_from_message(message, listener.bot_user_id()) {
                listener.handle(inbound).await;
            }
        }
        _ => debug!("ignoring event callback type"),
    }
    Ok(())
}

/// Build an [`InboundEvent`] from a Slack message event.
///
/// Returns `None` when the event carries no channel. A message counts as
/// addressed to the bot when it contains `<@bot_user_id>` or arrives in a
/// direct-message channel.
#[must_use]
pub fn inbound_from_message(message: &SlackMessageEvent, bot_user_id: &str) -> Option<InboundEvent> {
    let channel_id = message.origin.channel.as_ref()?.to_string();
    let text = message
        .content
        .as_ref()
        .and_then(|content| content.text.clone())
        .unwrap_or_default();
    let sender_id = message.sender.user.as_ref().map(ToString::to_string);

    let mentioned = !bot_user_id.is_empty() && text.contains(&format!("<@{bot_user_id}>"));
    let direct = channel_id.starts_with('D');
    let from_self = sender_id.as_deref() == Some(bot_user_id);

    Some(InboundEvent {
        message_ts: message.origin.ts.to_string(),
        thread_ts: message.origin.thread_ts.as_ref().map(ToString::to_string),
        addressed_to_bot: mentioned || direct,
        from_bot: message.sender.bot_id.is_some() || from_self,
        subtype: message.subtype.as_ref().map(|subtype| format!("{subtype:?}")),
        channel_id,
        text,
        sender_id,
    })
}
