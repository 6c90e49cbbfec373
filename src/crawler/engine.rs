//! Crawl engine - runs jobs as cancellable background tasks
//!
//! Each accepted start spawns one task that walks the pipeline:
//! - Mark the job `Crawling`
//! - Fetch and parse the target page
//! - Analyze the document and scan its links for breakage
//! - Record the broken links found
//! - Persist exactly one terminal status
//!
//! A stop request is observed at the check-points between phases and again,
//! atomically, when the terminal status is written. Nothing a run does can
//! propagate an error to the caller of [`CrawlEngine::start_crawl`].

use crate::config::Config;
use crate::crawler::analyzer::{analyze_document, PageAnalysis, PageMetadata};
use crate::crawler::fetcher::{build_http_client, fetch_page, FetchedPage};
use crate::crawler::parser::parse_document;
use crate::crawler::registry::{JobRegistry, RunHandle};
use crate::crawler::scanner::{collect_link_targets, scan_links, BrokenLink};
use crate::state::JobStatus;
use crate::storage::Storage;
use crate::SitelensError;
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// Why a run ended early
#[derive(Debug)]
enum Halt {
    /// A stop request was observed at a check-point
    Stopped,
    /// A phase failed; carries the message persisted on the job
    Failed(String),
}

impl From<SitelensError> for Halt {
    fn from(error: SitelensError) -> Self {
        Halt::Failed(error.to_string())
    }
}

/// Everything a successful run persists
#[derive(Debug)]
struct CrawlReport {
    analysis: PageAnalysis,
    broken: Vec<BrokenLink>,
}

struct Shared<S> {
    storage: Arc<Mutex<S>>,
    registry: JobRegistry,
    client: Client,
    max_concurrent_checks: usize,
}

impl<S> Shared<S> {
    fn lock_storage(&self) -> MutexGuard<'_, S> {
        lock(&self.storage)
    }
}

fn lock<S: ?Sized>(storage: &Mutex<S>) -> MutexGuard<'_, S> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts, stops and tracks crawl jobs
///
/// Cloning is cheap; every clone drives the same registry and storage.
pub struct CrawlEngine<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for CrawlEngine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Storage + Send + 'static> CrawlEngine<S> {
    /// Creates an engine over `storage`
    ///
    /// # Arguments
    ///
    /// * `storage` - Backend holding the jobs
    /// * `client` - HTTP client used for the page fetch and every link check
    /// * `max_concurrent_checks` - Upper bound on in-flight link checks per run
    pub fn new(storage: S, client: Client, max_concurrent_checks: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage: Arc::new(Mutex::new(storage)),
                registry: JobRegistry::new(),
                client,
                max_concurrent_checks,
            }),
        }
    }

    /// Creates an engine with an HTTP client built from `config`
    pub fn from_config(storage: S, config: &Config) -> Result<Self, SitelensError> {
        let client = build_http_client(&config.user_agent, &config.crawler)?;
        Ok(Self::new(
            storage,
            client,
            config.crawler.max_concurrent_checks,
        ))
    }

    /// Shared handle to the storage backend
    pub fn storage(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.shared.storage)
    }

    /// Starts a background crawl of `job_id` and returns immediately
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The run was accepted
    /// * `Err(SitelensError::JobNotFound)` - No such job
    /// * `Err(SitelensError::AlreadyRunning)` - The job already has a live run
    /// * `Err(SitelensError::ShuttingDown)` - The engine no longer accepts runs
    pub fn start_crawl(&self, job_id: &str) -> Result<(), SitelensError> {
        let job = self
            .shared
            .lock_storage()
            .get_job(job_id)?
            .ok_or_else(|| SitelensError::JobNotFound(job_id.to_string()))?;

        let handle = self.shared.registry.begin_run(job_id)?;
        tracing::info!("Starting crawl of {} (job {})", job.url, job_id);

        tokio::spawn(run_job(Arc::clone(&self.shared), handle, job.url));
        Ok(())
    }

    /// Requests that `job_id` stop and marks it `Stopped` right away
    ///
    /// Never blocks on the run itself and may be called any number of times.
    /// A storage failure is logged, not returned.
    pub fn stop_crawl(&self, job_id: &str) {
        let result = self.shared.registry.request_stop(job_id, |signaled| {
            if signaled {
                tracing::info!("Stop requested for job {}", job_id);
            }
            self.shared.lock_storage().set_stopped(job_id)
        });

        if let Err(e) = result {
            tracing::warn!("Failed to mark job {} as stopped: {}", job_id, e);
        }
    }

    /// Returns true while `job_id` has a live run
    pub fn is_active(&self, job_id: &str) -> bool {
        self.shared.registry.is_active(job_id)
    }

    /// Lists jobs with a live run
    pub fn active_jobs(&self) -> Vec<String> {
        self.shared.registry.active_jobs()
    }

    /// Waits until `job_id` has no live run
    pub async fn wait_for(&self, job_id: &str) {
        self.shared.registry.wait_until_inactive(job_id).await
    }

    /// Refuses new runs and signals every live run to stop
    ///
    /// Returns the signaled jobs; pass them to [`wait_for`](Self::wait_for)
    /// to let them persist their terminal status.
    pub fn shutdown(&self) -> Vec<String> {
        let signaled = self.shared.registry.shutdown();
        if !signaled.is_empty() {
            tracing::info!("Shutting down, stopping {} running jobs", signaled.len());
        }
        signaled
    }
}

/// Drives one run from `Crawling` to its terminal status
async fn run_job<S: Storage + Send + 'static>(
    shared: Arc<Shared<S>>,
    handle: RunHandle,
    url: String,
) {
    let job_id = handle.job_id().to_string();

    // A stop that lands first must not be overwritten by `Crawling`
    let marked = shared.registry.with_run(&handle, |stop_requested| {
        if stop_requested {
            return Ok(false);
        }
        shared
            .lock_storage()
            .set_status(&job_id, JobStatus::Crawling)
            .map(|()| true)
    });

    let outcome = match marked {
        Ok(false) => Err(Halt::Stopped),
        Ok(true) => {
            // A panic inside the pipeline surfaces here as a JoinError
            let task = tokio::spawn(pipeline(
                shared.client.clone(),
                handle.clone(),
                url,
                shared.max_concurrent_checks,
            ));
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Halt::Failed(format!("Crawl task failed: {}", e))),
            }
        }
        Err(e) => Err(Halt::Failed(format!("Failed to update database: {}", e))),
    };

    // Rows go in before the terminal write; a stop that arrives meanwhile
    // clears them again under the registry lock
    if let Ok(report) = &outcome {
        if !handle.is_stop_requested() {
            record_broken_links(&*shared.storage, &job_id, &report.broken);
        }
    }

    shared.registry.finish(&handle, |stop_requested| {
        let mut storage = shared.lock_storage();
        persist_outcome(&mut *storage, &job_id, stop_requested, outcome)
    });
}

async fn pipeline(
    client: Client,
    handle: RunHandle,
    url: String,
    max_concurrent_checks: usize,
) -> Result<CrawlReport, Halt> {
    checkpoint(&handle)?;
    let base_url = Url::parse(&url).map_err(SitelensError::from)?;

    let page = fetch_page(&client, base_url.as_str()).await?;
    tracing::debug!(
        "Fetched {} ({} bytes, HTTP {})",
        page.final_url,
        page.body.len(),
        page.status_code
    );
    checkpoint(&handle)?;

    let (analysis, targets) = inspect_page(&page, &base_url, &handle)?;
    let broken = scan_links(&client, targets, max_concurrent_checks).await;

    Ok(CrawlReport { analysis, broken })
}

/// Parses and analyzes the page; the document tree never crosses an await
fn inspect_page(
    page: &FetchedPage,
    base_url: &Url,
    handle: &RunHandle,
) -> Result<(PageAnalysis, Vec<String>), Halt> {
    let document = parse_document(page)?;
    checkpoint(handle)?;

    let analysis = analyze_document(&document, base_url);
    checkpoint(handle)?;

    let targets = collect_link_targets(&document, base_url);
    Ok((analysis, targets))
}

fn checkpoint(handle: &RunHandle) -> Result<(), Halt> {
    if handle.is_stop_requested() {
        tracing::debug!("Job {} observed stop request", handle.job_id());
        return Err(Halt::Stopped);
    }
    Ok(())
}

/// Replaces the job's broken-link rows, taking the storage lock per row
fn record_broken_links<S: Storage + ?Sized>(
    storage: &Mutex<S>,
    job_id: &str,
    links: &[BrokenLink],
) {
    if let Err(e) = lock(storage).clear_broken_links(job_id) {
        tracing::warn!("Failed to clear old broken links for job {}: {}", job_id, e);
    }

    for link in links {
        if let Err(e) = lock(storage).append_broken_link(job_id, link) {
            tracing::warn!(
                "Failed to record broken link {} for job {}: {}",
                link.url,
                job_id,
                e
            );
        }
    }
}

/// Writes the single terminal status of a run
///
/// Called under the registry lock, so a stop request either precedes this
/// entirely (and wins) or follows it and overwrites the status. Only a
/// fixed number of statements run here; broken-link rows are written
/// beforehand by [`record_broken_links`].
fn persist_outcome<S: Storage + ?Sized>(
    storage: &mut S,
    job_id: &str,
    stop_requested: bool,
    outcome: Result<CrawlReport, Halt>,
) {
    match outcome {
        _ if stop_requested => persist_stopped(storage, job_id),
        Err(Halt::Stopped) => persist_stopped(storage, job_id),
        Err(Halt::Failed(message)) => {
            tracing::error!("Crawl of job {} failed: {}", job_id, message);
            if let Err(e) = storage.set_error(job_id, &message) {
                tracing::error!("Failed to record error for job {}: {}", job_id, e);
            }
        }
        Ok(report) => persist_report(storage, job_id, report),
    }
}

fn persist_stopped<S: Storage + ?Sized>(storage: &mut S, job_id: &str) {
    tracing::info!("Crawl of job {} stopped", job_id);
    // Rows recorded before a late stop would otherwise outlive the run
    if let Err(e) = storage.clear_broken_links(job_id) {
        tracing::warn!("Failed to clear broken links for job {}: {}", job_id, e);
    }
    if let Err(e) = storage.set_stopped(job_id) {
        tracing::warn!("Failed to mark job {} as stopped: {}", job_id, e);
    }
}

fn persist_report<S: Storage + ?Sized>(storage: &mut S, job_id: &str, report: CrawlReport) {
    let metadata = PageMetadata {
        analysis: report.analysis,
        broken_links: u32::try_from(report.broken.len()).unwrap_or(u32::MAX),
    };

    match storage.save_metadata(job_id, &metadata) {
        Ok(()) => tracing::info!(
            "Crawl of job {} completed: {} internal, {} external, {} broken links",
            job_id,
            metadata.analysis.internal_links,
            metadata.analysis.external_links,
            metadata.broken_links
        ),
        Err(e) => {
            tracing::error!("Failed to save metadata for job {}: {}", job_id, e);
            let message = format!("Failed to update database: {}", e);
            if let Err(e) = storage.set_error(job_id, &message) {
                tracing::error!("Failed to record error for job {}: {}", job_id, e);
            }
        }
    }
}
