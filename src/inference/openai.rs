//! OpenAI-compatible chat completion backend.
//!
//! Talks to any server exposing `/models` and `/chat/completions` (vLLM,
//! llama.cpp server, LM Studio). When `[inference.launch]` is configured
//! the server process itself is the heavyweight resource: it is spawned on
//! load, polled until it answers, and killed on unload so GPU memory is
//! returned between bursts.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CompletionRequest, InferenceBackend};
use crate::config::{InferenceConfig, LaunchConfig};
use crate::{AppError, Result};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_LIMIT: usize = 300;

/// A ready model endpoint, plus the server process when we started it.
pub struct LoadedModel {
    client: reqwest::Client,
    server: Mutex<Option<Child>>,
}

impl LoadedModel {
    /// Whether this handle owns a launched server process.
    #[must_use]
    pub fn owns_server(&self) -> bool {
        self.server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Backend for OpenAI-compatible HTTP endpoints.
pub struct OpenAiBackend {
    config: InferenceConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiBackend {
    /// Create a backend from the inference configuration.
    #[must_use]
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &self.config.api_key {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| AppError::Config(format!("invalid inference api key: {err}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
            .build()
            .map_err(|err| AppError::Inference(format!("failed to build http client: {err}")))
    }

    async fn load_model(&self) -> Result<LoadedModel> {
        let client = self.build_client()?;

        let Some(launch) = &self.config.launch else {
            self.probe(&client).await?;
            return Ok(LoadedModel {
                client,
                server: Mutex::new(None),
            });
        };

        let mut child = spawn_server(launch)?;
        let deadline = Instant::now() + Duration::from_secs(self.config.ready_timeout_seconds);

        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|err| AppError::Inference(format!("cannot poll model server: {err}")))?
            {
                return Err(AppError::Inference(format!(
                    "model server exited during startup ({status})"
                )));
            }

            match self.probe(&client).await {
                Ok(()) => break,
                Err(err) if Instant::now() >= deadline => {
                    stop_server(&mut child).await;
                    return Err(AppError::Inference(format!(
                        "model server not ready after {}s: {err}",
                        self.config.ready_timeout_seconds
                    )));
                }
                Err(err) => debug!(%err, "model server not ready yet"),
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        Ok(LoadedModel {
            client,
            server: Mutex::new(Some(child)),
        })
    }

    /// Check that the endpoint answers and report whether it serves our model.
    async fn probe(&self, client: &reqwest::Client) -> Result<()> {
        let response = client
            .get(self.endpoint("models"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|err| AppError::Inference(format!("model endpoint unreachable: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Inference(format!(
                "model endpoint returned status {status}"
            )));
        }

        match response.json::<ModelList>().await {
            Ok(list) if list.data.iter().any(|m| m.id == self.config.model) => {}
            Ok(list) => warn!(
                model = %self.config.model,
                available = ?list.data.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
                "configured model not listed by endpoint"
            ),
            Err(err) => warn!(%err, "could not parse model list"),
        }
        Ok(())
    }

    async fn unload_model(&self, handle: LoadedModel) -> Result<()> {
        let server = handle
            .server
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = server {
            child
                .kill()
                .await
                .map_err(|err| AppError::Inference(format!("failed to stop model server: {err}")))?;
            info!("model server stopped");
        }
        Ok(())
    }

    async fn chat(&self, handle: &LoadedModel, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
        };

        let response = handle
            .client
            .post(self.endpoint("chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Inference(format!("completion request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(AppError::Inference(format!(
                "completion returned status {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AppError::Inference(format!("malformed completion response: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Inference("completion response had no content".into()))
    }
}

impl InferenceBackend for OpenAiBackend {
    type Handle = LoadedModel;

    fn load(&self) -> Pin<Box<dyn Future<Output = Result<LoadedModel>> + Send + '_>> {
        Box::pin(self.load_model())
    }

    fn unload(&self, handle: LoadedModel) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.unload_model(handle))
    }

    fn complete<'a>(
        &'a self,
        handle: &'a LoadedModel,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.chat(handle, request))
    }
}

fn spawn_server(launch: &LaunchConfig) -> Result<Child> {
    let child = Command::new(&launch.program)
        .args(&launch.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            AppError::Inference(format!("failed to spawn {}: {err}", launch.program))
        })?;

    info!(
        program = %launch.program,
        pid = child.id().unwrap_or(0),
        "model server spawned"
    );
    Ok(child)
}

async fn stop_server(child: &mut Child) {
    if let Err(err) = child.kill().await {
        warn!(%err, "failed to stop model server");
    }
}
