//! Slack Web API client and Socket Mode listener.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiReactionsAddRequest, SlackApiReactionsRemoveRequest,
    SlackApiToken, SlackApiTokenType, SlackApiTokenValue, SlackChannelId, SlackClient,
    SlackClientEventsListenerEnvironment, SlackClientHyperHttpsConnector, SlackClientSession,
    SlackClientSocketModeConfig, SlackClientSocketModeListener, SlackMessageContent,
    SlackReactionName, SlackSocketModeListenerCallbacks, SlackTs,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{events, ReplySink};
use crate::orchestrator::listener::EventListener;
use crate::{config::SlackConfig, AppError, Result};

const MAX_POST_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Identity of the bot user, discovered via `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// User id the bot is mentioned by (`<@U...>`).
    pub user_id: String,
}

/// Message to be delivered to Slack via chat.postMessage.
#[derive(Debug, Clone)]
pub struct SlackMessage {
    /// Target channel.
    pub channel: SlackChannelId,
    /// Message body in Slack `mrkdwn`.
    pub text: Option<String>,
    /// Parent thread, when replying in a thread.
    pub thread_ts: Option<SlackTs>,
}

impl SlackMessage {
    /// Create a plain-text reply in a thread.
    #[must_use]
    pub fn threaded(channel: SlackChannelId, thread_ts: SlackTs, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: Some(text.into()),
            thread_ts: Some(thread_ts),
        }
    }

    fn into_request(self) -> SlackApiChatPostMessageRequest {
        let content = SlackMessageContent {
            text: self.text,
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
            markdown_text: None,
        };

        SlackApiChatPostMessageRequest {
            channel: self.channel,
            content,
            as_user: None,
            icon_emoji: None,
            icon_url: None,
            link_names: Some(true),
            parse: None,
            thread_ts: self.thread_ts,
            username: None,
            reply_broadcast: None,
            unfurl_links: Some(false),
            unfurl_media: None,
        }
    }
}

/// Slack Web API wrapper bound to the bot token.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
}

impl SlackService {
    /// Create the HTTPS client used for Web API calls and Socket Mode.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        Ok(Self { client, bot_token })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Discover the bot's own user id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if `auth.test` fails (e.g. a revoked token).
    pub async fn identify(&self) -> Result<BotIdentity> {
        let response = self
            .http_session()
            .auth_test()
            .await
            .map_err(|err| AppError::Slack(format!("auth.test failed: {err}")))?;
        info!(user_id = %response.user_id, "slack bot authenticated");
        Ok(BotIdentity {
            user_id: response.user_id.to_string(),
        })
    }

    /// Post a message, backing off on rate limits and transient errors.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` once all attempts are exhausted.
    pub async fn post_message(&self, message: SlackMessage) -> Result<()> {
        let request = message.into_request();
        let session = self.http_session();
        let mut backoff = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match session.chat_post_message(&request).await {
                Ok(_) => return Ok(()),
                Err(err) if attempt >= MAX_POST_ATTEMPTS => {
                    return Err(AppError::Slack(format!(
                        "chat.postMessage failed after {attempt} attempts: {err}"
                    )));
                }
                Err(err) => {
                    let delay = match &err {
                        slack_morphism::errors::SlackClientError::RateLimitError(rate) => {
                            rate.retry_after.unwrap_or(backoff)
                        }
                        _ => backoff,
                    };
                    warn!(?err, delay = ?delay, attempt, "slack post failed; retrying");
                    sleep(delay).await;
                    backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
            }
        }
    }

    /// Start the Socket Mode listener, routing push events to `listener`.
    ///
    /// The returned task resolves with an error if the connection cannot be
    /// established; it resolves with `Ok` once `cancel` fires.
    #[must_use]
    pub fn spawn_socket_mode(
        &self,
        config: &SlackConfig,
        listener: Arc<EventListener>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(listener),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_push_events(events::handle_push_event);
        let socket_config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let socket = SlackClientSocketModeListener::new(&socket_config, listener_env, callbacks);
        tokio::spawn(async move {
            socket
                .listen_for(&app_token)
                .await
                .map_err(|err| AppError::Slack(format!("socket mode listen failed: {err}")))?;
            info!("socket mode connected");

            // Dropped connections are reconnected by the listener itself;
            // only cancellation ends this task after a successful connect.
            cancel.cancelled().await;
            socket.shutdown().await;
            info!("socket mode listener exited");
            Ok(())
        })
    }

    async fn react(&self, channel_id: &str, ts: &str, name: &str) -> Result<()> {
        let request = SlackApiReactionsAddRequest::new(
            SlackChannelId(channel_id.to_owned()),
            SlackReactionName(name.to_owned()),
            SlackTs(ts.to_owned()),
        );
        self.http_session()
            .reactions_add(&request)
            .await
            .map_err(|err| AppError::Slack(format!("reactions.add failed: {err}")))?;
        Ok(())
    }

    async fn unreact(&self, channel_id: &str, ts: &str, name: &str) -> Result<()> {
        let request = SlackApiReactionsRemoveRequest::new(SlackReactionName(name.to_owned()))
            .with_channel(SlackChannelId(channel_id.to_owned()))
            .with_timestamp(SlackTs(ts.to_owned()));
        self.http_session()
            .reactions_remove(&request)
            .await
            .map_err(|err| AppError::Slack(format!("reactions.remove failed: {err}")))?;
        Ok(())
    }
}

impl ReplySink for SlackService {
    fn post<'a>(
        &'a self,
        channel_id: &'a str,
        thread_ts: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let message = SlackMessage::threaded(
            SlackChannelId(channel_id.to_owned()),
            SlackTs(thread_ts.to_owned()),
            text,
        );
        Box::pin(self.post_message(message))
    }

    fn add_reaction<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.react(channel_id, ts, name))
    }

    fn remove_reaction<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.unreact(channel_id, ts, name))
    }
}
