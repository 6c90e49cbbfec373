//! Broken-link scanner
//!
//! Checks every anchor on a page with a lightweight HEAD request. Checks run
//! as independent tasks gated by a semaphore, so at most `max_in_flight`
//! requests are outstanding for one scan; the scan returns only after every
//! task has finished.

use reqwest::Client;
use scraper::{Html, Selector};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// A link that failed its reachability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    /// Absolute URL that was checked
    pub url: String,
    /// HTTP status returned, or 0 when the request itself failed
    pub status_code: u16,
    /// Transport error text, or `HTTP {code}`
    pub error: String,
}

impl BrokenLink {
    pub fn is_transport_failure(&self) -> bool {
        self.status_code == 0
    }
}

/// Collects the absolute URL of every anchor with an `href`
///
/// Relative references are resolved against `base_url`; hrefs that cannot be
/// resolved are skipped. Document order is preserved and duplicates are kept.
pub fn collect_link_targets(document: &Html, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| match base_url.join(href.trim()) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::debug!("Skipping unresolvable href {:?}: {}", href, e);
                None
            }
        })
        .collect()
}

/// Classifies an HTTP status; anything at or above 400 is broken
pub fn classify_status(url: String, status_code: u16) -> Option<BrokenLink> {
    (status_code >= 400).then(|| BrokenLink {
        url,
        status_code,
        error: format!("HTTP {}", status_code),
    })
}

/// Checks a single link with a HEAD request
///
/// # Returns
///
/// * `None` - The link answered with a status below 400
/// * `Some(BrokenLink)` - The request failed or the status was 400 or above
pub async fn check_link(client: &Client, url: String) -> Option<BrokenLink> {
    match client.head(&url).send().await {
        Ok(response) => classify_status(url, response.status().as_u16()),
        Err(e) => Some(BrokenLink {
            url,
            status_code: 0,
            error: e.to_string(),
        }),
    }
}

/// Scans `targets` with HEAD requests, at most `max_in_flight` at a time
pub async fn scan_links(
    client: &Client,
    targets: Vec<String>,
    max_in_flight: usize,
) -> Vec<BrokenLink> {
    let client = client.clone();
    check_all(targets, max_in_flight, move |url| {
        let client = client.clone();
        async move { check_link(&client, url).await }
    })
    .await
}

/// Runs `probe` over every target with bounded parallelism
///
/// One task is spawned per target; each waits for a semaphore permit before
/// probing. Broken results are appended under a mutex as tasks complete, so
/// the returned order follows completion order, not input order. An empty
/// target list spawns nothing.
pub async fn check_all<F, Fut>(
    targets: Vec<String>,
    max_in_flight: usize,
    probe: F,
) -> Vec<BrokenLink>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<BrokenLink>> + Send + 'static,
{
    if targets.is_empty() {
        return Vec::new();
    }

    let total = targets.len();
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let broken = Arc::new(Mutex::new(Vec::new()));
    let probe = Arc::new(probe);
    let mut tasks = JoinSet::new();

    for url in targets {
        let semaphore = Arc::clone(&semaphore);
        let broken = Arc::clone(&broken);
        let probe = Arc::clone(&probe);

        tasks.spawn(async move {
            // The semaphore is never closed, so acquiring only fails if it were
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            if let Some(link) = (*probe)(url).await {
                broken
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(link);
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::warn!("Link check task failed: {}", e);
        }
    }

    let mut broken = broken.lock().unwrap_or_else(PoisonError::into_inner);
    tracing::debug!("Checked {} links, {} broken", total, broken.len());
    std::mem::take(&mut *broken)
}
