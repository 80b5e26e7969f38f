#![forbid(unsafe_code)]

//! `link-digest`: Slack link summarization bot binary.
//!
//! Bootstraps configuration, connects to Slack over Socket Mode, and runs
//! the single task worker that fetches, summarizes, and replies.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use link_digest::config::GlobalConfig;
use link_digest::fetch::web::WebFetcher;
use link_digest::inference::openai::OpenAiBackend;
use link_digest::inference::ModelManager;
use link_digest::orchestrator::listener::EventListener;
use link_digest::orchestrator::queue::task_queue;
use link_digest::orchestrator::worker::{TaskWorker, WorkerSettings};
use link_digest::slack::client::SlackService;
use link_digest::slack::ReplySink;
use link_digest::summarize::Summarizer;
use link_digest::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "link-digest", about = "Slack link summarization bot", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("link-digest bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.load_credentials().await?;
    info!(
        trigger = ?config.slack.trigger,
        model = %config.inference.model,
        "configuration loaded"
    );

    // ── Connect to Slack ────────────────────────────────
    let slack = Arc::new(SlackService::new(&config.slack)?);
    let identity = slack.identify().await?;
    info!(bot_user_id = %identity.user_id, "slack identity resolved");
    let replies: Arc<dyn ReplySink> = Arc::clone(&slack) as Arc<dyn ReplySink>;

    // ── Start the task worker ───────────────────────────
    let ct = CancellationToken::new();
    let (sender, receiver) = task_queue();
    let worker = TaskWorker::new(
        receiver,
        ModelManager::new(OpenAiBackend::new(config.inference.clone())),
        Arc::new(WebFetcher::new(&config.fetch)?),
        Summarizer::new(config.inference.language.clone()),
        Arc::clone(&replies),
        WorkerSettings::from_config(&config),
    );
    let worker_handle = worker.spawn(ct.clone());

    // ── Start Socket Mode ───────────────────────────────
    let listener = Arc::new(EventListener::new(
        sender,
        replies,
        config.slack.trigger,
        identity.user_id,
        config.slack.help_text.clone(),
    ));
    let mut socket_handle = slack.spawn_socket_mode(&config.slack, listener, ct.clone());
    info!("link-digest ready");

    // ── Wait for shutdown signal or listener failure ────
    let socket_exit = tokio::select! {
        () = shutdown_signal() => None,
        joined = &mut socket_handle => Some(joined),
    };

    let outcome = match socket_exit {
        None => {
            info!("shutdown signal received");
            ct.cancel();
            match socket_handle.await {
                Ok(result) => result,
                Err(err) => Err(AppError::Slack(format!("socket mode task panicked: {err}"))),
            }
        }
        Some(joined) => {
            let result = match joined {
                Ok(Ok(())) => Err(AppError::Slack("socket mode listener exited".into())),
                Ok(Err(err)) => Err(err),
                Err(err) => Err(AppError::Slack(format!("socket mode task panicked: {err}"))),
            };
            if let Err(err) = &result {
                error!(%err, "socket mode listener failed; shutting down");
            }
            ct.cancel();
            result
        }
    };

    // ── Wait for the worker to finish its current task ──
    match worker_handle.await {
        Ok(stats) => info!(
            summarized = stats.summarized,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "task worker joined"
        ),
        Err(err) => error!(%err, "task worker panicked"),
    }
    info!("link-digest shut down");

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
