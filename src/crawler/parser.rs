//! HTML parsing for fetched pages
//!
//! Turns a [`FetchedPage`] into a queryable `scraper::Html` tree. The tree is
//! not `Send`, so callers analyze it synchronously and keep it out of any
//! `.await`.

use crate::crawler::fetcher::FetchedPage;
use crate::SitelensError;
use scraper::Html;

/// Parses a fetched page into a document tree
///
/// html5ever recovers from malformed markup, so the only hard failure is a
/// payload that is not markup at all: a `Content-Type` header naming neither
/// HTML nor XML. A missing header is accepted.
///
/// # Example
///
/// ```
/// use sitelens::crawler::{parse_document, FetchedPage};
///
/// let page = FetchedPage {
///     final_url: "https://example.com/".to_string(),
///     status_code: 200,
///     content_type: Some("text/html; charset=utf-8".to_string()),
///     body: "<html><head><title>Test</title></head></html>".to_string(),
/// };
/// assert!(parse_document(&page).is_ok());
/// ```
pub fn parse_document(page: &FetchedPage) -> Result<Html, SitelensError> {
    if let Some(content_type) = page.content_type.as_deref() {
        if !is_markup(content_type) {
            return Err(SitelensError::Parse {
                url: page.final_url.clone(),
                message: format!("expected an HTML document, got {}", content_type),
            });
        }
    }

    let document = Html::parse_document(&page.body);

    if !document.errors.is_empty() {
        tracing::debug!(
            "Recovered from {} markup errors in {}",
            document.errors.len(),
            page.final_url
        );
    }

    Ok(document)
}

/// Returns true for HTML, XHTML and generic XML media types
fn is_markup(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    media_type.contains("html") || media_type.contains("xml")
}
