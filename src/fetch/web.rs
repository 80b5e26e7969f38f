//! HTTP page fetcher with Readability and html2text extraction.

use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info_span, Instrument};

use super::ContentFetcher;
use crate::config::FetchConfig;
use crate::models::page::FetchedPage;
use crate::{AppError, Result};

/// Width used when rendering HTML to plain text.
const HTML2TEXT_WIDTH: usize = 120;

/// Readability output shorter than this is treated as a miss.
const READABILITY_MIN_CHARS: usize = 100;

/// Bytes of markup allowed per character of `max_length`.
const BODY_BYTES_PER_CHAR: usize = 256;

/// Lower bound on the body cap so short limits still see a whole page.
const MIN_BODY_BYTES: usize = 256 * 1024;

/// Marker appended to text cut at `max_length`.
const TRUNCATION_MARKER: &str = "\n\n...(truncated)";

#[allow(clippy::unwrap_used)] // Literal pattern; covered by tests.
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

#[allow(clippy::unwrap_used)] // Literal pattern; covered by tests.
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Fetches pages over HTTP and extracts their readable text.
pub struct WebFetcher {
    client: reqwest::Client,
}

impl WebFetcher {
    /// Build a fetcher using the configured User-Agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Fetch` if the HTTP client cannot be constructed.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| AppError::Fetch(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }

    async fn fetch_page(&self, url: &str, max_length: usize) -> Result<FetchedPage> {
        let mut response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html, application/xhtml+xml;q=0.9, text/plain;q=0.8, */*;q=0.1",
            )
            .send()
            .await
            .map_err(|err| AppError::Fetch(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("server returned status {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.contains("application/pdf") {
            return Err(AppError::Fetch("PDF files are not supported".into()));
        }

        let is_html = content_type.is_empty() || content_type.contains("html");
        if !is_html && !content_type.starts_with("text/") {
            return Err(AppError::Fetch(format!(
                "unsupported content type {content_type}"
            )));
        }

        let limit = body_limit(max_length);
        if let Some(declared) = response.content_length() {
            if u64::try_from(limit).is_ok_and(|cap| declared > cap) {
                debug!(url, declared, limit, "body exceeds cap; reading prefix only");
            }
        }

        let mut bytes = Vec::new();
        while bytes.len() < limit {
            let chunk = response
                .chunk()
                .await
                .map_err(|err| AppError::Fetch(format!("failed to read response body: {err}")))?;
            match chunk {
                Some(chunk) => bytes.extend_from_slice(&chunk),
                None => break,
            }
        }
        bytes.truncate(limit);
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let (title, text) = if is_html {
            let title = extract_title(&body).unwrap_or_else(|| url.to_owned());
            (title, extract_text(&body, url))
        } else {
            (url.to_owned(), body)
        };

        let text = truncate_chars(&collapse_blank_lines(&text), max_length);
        debug!(url, content_type, chars = text.chars().count(), "page fetched");

        Ok(FetchedPage {
            title,
            text,
            url: url.to_owned(),
        })
    }
}

impl ContentFetcher for WebFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        max_length: usize,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedPage>> + Send + 'a>> {
        Box::pin(
            self.fetch_page(url, max_length)
                .instrument(info_span!("fetch_page", url)),
        )
    }
}

/// Extract the document `<title>`, if present and non-blank.
#[must_use]
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE.captures(html)?.get(1)?.as_str();
    let title = decode_entities(&raw.split_whitespace().collect::<Vec<_>>().join(" "));
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Extract readable body text: Readability first, html2text as fallback.
#[must_use]
pub fn extract_text(html: &str, url: &str) -> String {
    if let Some(text) = try_readability(html, url) {
        if text.chars().count() >= READABILITY_MIN_CHARS {
            return text;
        }
    }
    try_html2text(html).unwrap_or_default()
}

fn try_readability(html: &str, url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut cursor = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut cursor, &parsed) {
        Ok(product) => {
            let text = product.text.trim().to_owned();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        Err(err) => {
            debug!(%err, "readability extraction failed");
            None
        }
    }
}

fn try_html2text(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), HTML2TEXT_WIDTH).ok()?;
    let trimmed = text.trim().to_owned();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Maximum number of body bytes read for a page capped at `max_length` characters.
#[must_use]
pub fn body_limit(max_length: usize) -> usize {
    max_length.saturating_mul(BODY_BYTES_PER_CHAR).max(MIN_BODY_BYTES)
}

/// Squeeze runs of three or more newlines down to one blank line.
#[must_use]
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUNS.replace_all(text, "\n\n").into_owned()
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_owned(),
    }
}
