//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::{BrokenLink, PageMetadata};
use crate::state::JobStatus;
use crate::storage::{BrokenLinkRecord, JobRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Crawl job not found: {0}")]
    JobNotFound(String),

    #[error("URL is already registered: {0}")]
    DuplicateUrl(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The engine holds the backend behind a mutex, so implementations only need
/// to be `Send`.
pub trait Storage {
    // ===== Job Management =====

    /// Registers a new job for `url` in the `Pending` state
    ///
    /// # Returns
    ///
    /// * `Ok(JobRecord)` - The newly created job
    /// * `Err(StorageError::DuplicateUrl)` - A job already targets this URL
    fn create_job(&mut self, url: &str) -> StorageResult<JobRecord>;

    /// Gets a job by ID
    fn get_job(&self, job_id: &str) -> StorageResult<Option<JobRecord>>;

    /// Gets a job by target URL
    fn get_job_by_url(&self, url: &str) -> StorageResult<Option<JobRecord>>;

    /// Lists every job, newest first
    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>>;

    /// Deletes a job together with its broken links
    ///
    /// Returns false if no such job existed.
    fn delete_job(&mut self, job_id: &str) -> StorageResult<bool>;

    // ===== Status Transitions =====

    /// Sets the status of a job
    ///
    /// Every status except `Crawling` stamps `last_crawled_at`. Entering
    /// `Crawling` clears any previous error message.
    fn set_status(&mut self, job_id: &str, status: JobStatus) -> StorageResult<()>;

    /// Marks a job as failed with a human-readable reason
    fn set_error(&mut self, job_id: &str, message: &str) -> StorageResult<()>;

    /// Marks a job as stopped
    fn set_stopped(&mut self, job_id: &str) -> StorageResult<()> {
        self.set_status(job_id, JobStatus::Stopped)
    }

    /// Stores the page metadata and marks the job completed
    fn save_metadata(&mut self, job_id: &str, metadata: &PageMetadata) -> StorageResult<()>;

    // ===== Broken Links =====

    /// Records one broken link for a job
    fn append_broken_link(&mut self, job_id: &str, link: &BrokenLink) -> StorageResult<()>;

    /// Removes every broken link recorded for a job
    fn clear_broken_links(&mut self, job_id: &str) -> StorageResult<()>;

    /// Gets the broken links recorded for a job, oldest first
    fn get_broken_links(&self, job_id: &str) -> StorageResult<Vec<BrokenLinkRecord>>;

    // ===== Statistics =====

    /// Counts jobs per status; statuses with no jobs map to zero
    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>>;
}
