//! Page content retrieval.
//!
//! The worker only depends on the [`ContentFetcher`] trait; [`web`]
//! provides the HTTP implementation used in production.

pub mod web;

use std::future::Future;
use std::pin::Pin;

use crate::models::page::FetchedPage;
use crate::Result;

/// Retrieves readable page content for a locator.
///
/// Implementations are stateless per call and bound the returned text to
/// `max_length` characters.
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url` and extract its title and text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Fetch`](crate::AppError::Fetch) on transport
    /// errors, non-success statuses, or unsupported content types.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        max_length: usize,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedPage>> + Send + 'a>>;
}
