//! Extracted page content handed from the fetcher to the summarizer.

/// Readable content of one fetched page.
///
/// Lives only for the duration of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Page title; the locator itself when the page has none.
    pub title: String,
    /// Extracted body text, already bounded to the configured length.
    pub text: String,
    /// Locator the page was fetched from.
    pub url: String,
}

impl FetchedPage {
    /// Whether the extracted text carries anything worth summarizing.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
