#![forbid(unsafe_code)]

//! `link-digest`: summarizes web pages linked in Slack messages.
//!
//! Inbound Socket Mode events are turned into ordered summary tasks by
//! the [`orchestrator::listener`], handed to a single worker through the
//! [`orchestrator::queue`], and executed by the [`orchestrator::worker`]
//! against a lazily loaded model managed by [`inference::ModelManager`].

pub mod config;
pub mod errors;
pub mod fetch;
pub mod inference;
pub mod links;
pub mod models;
pub mod orchestrator;
pub mod slack;
pub mod summarize;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
