//! Locator extraction from raw Slack message text.
//!
//! Slack delivers links as `<https://example.com>` or
//! `<https://example.com|label>`. Those decorated forms take precedence:
//! bare `https://...` patterns are only consulted when no decorated link
//! is present, so a link is never extracted twice.
//!
//! Slack escapes `&`, `<` and `>` in message text; locators are unescaped
//! before de-duplication so query strings reach the fetcher intact.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)] // Literal patterns; covered by tests.
static DECORATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^|>\s]+)(?:\|[^>]*)?>").unwrap());

#[allow(clippy::unwrap_used)] // Literal patterns; covered by tests.
static BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

/// Extract the ordered, de-duplicated list of locators in `text`.
///
/// Returns an empty vector when nothing is found.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    let decorated: Vec<&str> = DECORATED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if decorated.is_empty() {
        dedup_in_order(BARE.find_iter(text).map(|m| m.as_str()))
    } else {
        dedup_in_order(decorated)
    }
}

fn dedup_in_order<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(unescape_slack)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Undo Slack's message-text escaping. `&amp;` goes last so `&amp;lt;`
/// stays a literal `&lt;`.
fn unescape_slack(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
