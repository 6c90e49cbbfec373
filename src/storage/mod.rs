//! Storage module for persisting crawl jobs
//!
//! This module handles all database operations for the engine, including:
//! - SQLite database initialization and schema management
//! - Job records and their status transitions
//! - Page metadata of completed crawls
//! - Broken-link rows, cascade-deleted with their job

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawler::PageMetadata;
use crate::state::JobStatus;
use crate::SitelensError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SitelensError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SitelensError> {
    SqliteStorage::new(path)
}

/// Represents a crawl job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub url: String,
    pub status: JobStatus,
    pub created_at: String,
    pub last_crawled_at: Option<String>,
    /// Present only while the job is `Completed`
    pub metadata: Option<PageMetadata>,
    /// Present only while the job is in `Error`
    pub error_message: Option<String>,
}

/// Represents a broken link found by a crawl
#[derive(Debug, Clone)]
pub struct BrokenLinkRecord {
    pub id: i64,
    pub job_id: String,
    pub link_url: String,
    /// 0 when the request itself failed
    pub status_code: u16,
    pub error_message: String,
    pub discovered_at: String,
}
