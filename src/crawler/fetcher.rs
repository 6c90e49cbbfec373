//! HTTP fetcher implementation
//!
//! This module handles the page GET for a crawl job:
//! - Building the shared HTTP client with the crawler's user agent
//! - Fetching the target page body
//! - Classifying transport failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::SitelensError;
use reqwest::Client;
use std::time::Duration;

/// A page body returned by the target server
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Content-Type header value, if the server sent one
    pub content_type: Option<String>,
    /// Page body content
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Builds an HTTP client with proper configuration
///
/// The same client serves the page fetch and every broken-link check, so both
/// inherit the request timeout configured here.
///
/// # Example
///
/// ```no_run
/// use sitelens::config::{CrawlerConfig, UserAgentConfig};
/// use sitelens::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "Sitelens".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.fetch_timeout))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page with a single GET
///
/// Non-2xx responses are not an error at this stage: their body is returned
/// and the caller decides what to do with it. Transport failures (DNS,
/// connect, TLS, timeout, body read) are errors.
///
/// # Returns
///
/// * `Ok(FetchedPage)` - The server answered
/// * `Err(SitelensError::Timeout)` - The client-level timeout elapsed
/// * `Err(SitelensError::Transport)` - Any other transport failure
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, SitelensError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_transport_error(url, e))?;

    let status_code = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !response.status().is_success() {
        tracing::debug!("{} answered HTTP {}, parsing body anyway", url, status_code);
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport_error(url, e))?;

    Ok(FetchedPage {
        final_url,
        status_code,
        content_type,
        body,
    })
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> SitelensError {
    if error.is_timeout() {
        SitelensError::Timeout {
            url: url.to_string(),
        }
    } else {
        SitelensError::Transport {
            url: url.to_string(),
            source: error,
        }
    }
}
