//! Page summarization on top of a loaded model.
//!
//! Builds the prompt, runs one completion, and turns the model's markdown
//! into Slack `mrkdwn` headed by the page title and a source link.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::inference::{CompletionRequest, InferenceBackend};
use crate::models::page::FetchedPage;
use crate::{AppError, Result};

#[allow(clippy::unwrap_used)] // Literal pattern; covered by tests.
static DASH_BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*-[ \t]+").unwrap());

/// Stateless summarizer; everything heavyweight lives in the backend handle.
#[derive(Debug, Clone)]
pub struct Summarizer {
    language: String,
}

impl Summarizer {
    /// Create a summarizer that writes summaries in `language`.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Build the completion request for one page.
    #[must_use]
    pub fn build_request(&self, page: &FetchedPage) -> CompletionRequest {
        let language = &self.language;
        let system = format!(
            "You are an assistant that summarizes web pages concisely in {language}."
        );
        let user = format!(
            "Summarize the following web page in {language} so it can be skimmed in Slack.\n\
             \n\
             Rules:\n\
             - Keep technical terms and nuance; drop redundant phrasing.\n\
             - Use short sentences and frequent line breaks.\n\
             - Start every bullet with \"• \".\n\
             - Follow the output format exactly.\n\
             - Do not use asterisks anywhere except in the headings below.\n\
             \n\
             Output format:\n\
             *💡 In one line*\n\
             (the core point or conclusion in one or two sentences)\n\
             \n\
             *📝 Overview and background*\n\
             • (why the page was written, needed context)\n\
             \n\
             *🎯 Key points*\n\
             • (three to five of the most important facts, results, or claims)\n\
             \n\
             ---\n\
             Page title: {title}\n\
             Body:\n\
             {text}\n",
            title = page.title,
            text = page.text,
        );
        CompletionRequest { system, user }
    }

    /// Summarize `page` with the loaded model behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Inference`] if generation fails or yields no text.
    pub async fn summarize<B: InferenceBackend>(
        &self,
        backend: &B,
        handle: &B::Handle,
        page: &FetchedPage,
    ) -> Result<String> {
        let request = self.build_request(page);
        let raw = backend.complete(handle, &request).await?;
        debug!(url = %page.url, raw_chars = raw.chars().count(), "completion received");

        let body = to_slack_mrkdwn(&raw);
        if body.trim().is_empty() {
            return Err(AppError::Inference("model returned an empty summary".into()));
        }
        Ok(format_reply(page, &body))
    }
}

/// Convert common markdown output to Slack `mrkdwn`.
///
/// Double asterisks become single ones and `-` bullets become `•`.
#[must_use]
pub fn to_slack_mrkdwn(raw: &str) -> String {
    let single = raw.replace("**", "*");
    DASH_BULLET.replace_all(&single, "• ").into_owned()
}

/// Frame a summary body with the page title and a source link.
#[must_use]
pub fn format_reply(page: &FetchedPage, body: &str) -> String {
    format!(
        "\u{1f4dd} *{}*\n<{}|\u{1f517} Source>\n\n{}",
        page.title,
        page.url,
        body.trim()
    )
}
