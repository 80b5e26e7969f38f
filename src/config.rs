//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service under which Slack tokens are stored.
const KEYRING_SERVICE: &str = "link-digest";

/// Which Slack messages qualify for summarization.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Only messages that mention the bot (or direct messages).
    #[default]
    Mention,
    /// Every ordinary message in channels the bot has joined.
    AnyMessage,
}

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// not from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SlackConfig {
    /// Which messages trigger summarization.
    pub trigger: TriggerMode,
    /// Reply sent when a qualifying mention carries no link.
    pub help_text: Option<String>,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Task worker polling and burst-drain tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Upper bound on a single queue wait before the worker re-checks state.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Idle time after the last task before the model is released.
    #[serde(default = "default_drain_after_seconds")]
    pub drain_after_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            drain_after_seconds: default_drain_after_seconds(),
        }
    }
}

impl WorkerConfig {
    /// Queue poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Burst-drain threshold as a [`Duration`].
    #[must_use]
    pub fn drain_after(&self) -> Duration {
        Duration::from_secs(self.drain_after_seconds)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_drain_after_seconds() -> u64 {
    120
}

/// Page retrieval settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FetchConfig {
    /// Maximum number of characters of extracted text handed to the model.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// HTTP request timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,
    /// User-Agent header sent with page requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            timeout_seconds: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_text_length() -> usize {
    6000
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .into()
}

/// Command used to start a local model server on demand.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchConfig {
    /// Executable to run (e.g. `vllm`).
    pub program: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Model endpoint and sampling settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible API, including the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent with every completion request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Top-k sampling cutoff.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Per-request timeout for a single completion.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// How long to wait for a launched server to become ready.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: u64,
    /// Language the summary is written in.
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional server process started on acquire and stopped on release.
    #[serde(default)]
    pub launch: Option<LaunchConfig>,
    /// Bearer token for the endpoint (populated at runtime).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            request_timeout_seconds: default_request_timeout(),
            ready_timeout_seconds: default_ready_timeout(),
            language: default_language(),
            launch: None,
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/v1".into()
}

fn default_model() -> String {
    "openai/gpt-oss-20b".into()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    50
}

fn default_request_timeout() -> u64 {
    600
}

fn default_ready_timeout() -> u64 {
    900
}

fn default_language() -> String {
    "Japanese".into()
}

/// Global configuration parsed from `config.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Slack connectivity settings.
    pub slack: SlackConfig,
    /// Worker polling and drain settings.
    pub worker: WorkerConfig,
    /// Page retrieval settings.
    pub fetch: FetchConfig,
    /// Model endpoint settings.
    pub inference: InferenceConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback, and
    /// the optional inference API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required Slack tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        self.inference.api_key = env::var("INFERENCE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.worker.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "worker.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.fetch.max_text_length == 0 {
            return Err(AppError::Config(
                "fetch.max_text_length must be greater than zero".into(),
            ));
        }

        url::Url::parse(&self.inference.base_url)
            .map_err(|err| AppError::Config(format!("inference.base_url invalid: {err}")))?;

        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(AppError::Config(
                "inference.temperature must be within 0.0..=2.0".into(),
            ));
        }

        if self
            .inference
            .launch
            .as_ref()
            .is_some_and(|launch| launch.program.trim().is_empty())
        {
            return Err(AppError::Config(
                "inference.launch.program must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain service {KEYRING_SERVICE} or {env_key} env var"
        ))),
    }
}
