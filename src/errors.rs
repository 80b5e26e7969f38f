//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Slack API or Socket Mode failure, including reply delivery.
    Slack(String),
    /// Page retrieval or content extraction failure.
    Fetch(String),
    /// Model load, unload, or generation failure.
    Inference(String),
    /// Task queue hand-off failure.
    Queue(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// The diagnostic text without its kind prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Config(msg)
            | Self::Slack(msg)
            | Self::Fetch(msg)
            | Self::Inference(msg)
            | Self::Queue(msg)
            | Self::Io(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Fetch(msg) => write!(f, "fetch: {msg}"),
            Self::Inference(msg) => write!(f, "inference: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
