//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{BrokenLink, HeadingCounts, HtmlVersion, PageAnalysis, PageMetadata};
use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BrokenLinkRecord, JobRecord};
use crate::SitelensError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, url, status, created_at, last_crawled_at, title, html_version,
     h1_count, h2_count, h3_count, h4_count, h5_count, h6_count,
     internal_links, external_links, broken_links, has_login_form, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SitelensError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SitelensError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SitelensError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_job(&self, filter: &str, value: &str) -> StorageResult<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE {} = ?1", JOB_COLUMNS, filter);
        let job = self
            .conn
            .query_row(&sql, params![value], job_from_row)
            .optional()?;
        Ok(job)
    }

    fn require_updated(job_id: &str, changed: usize) -> StorageResult<()> {
        if changed == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }
}

/// Maps a `jobs` row, hiding metadata and error text the status does not own
fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status_text: String = row.get(2)?;
    let status = JobStatus::from_db_string(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown job status {:?}", status_text).into(),
        )
    })?;

    let metadata = if status == JobStatus::Completed {
        let html_version: Option<String> = row.get(6)?;
        let mut headings = HeadingCounts::default();
        for (level, count) in headings.0.iter_mut().enumerate() {
            *count = row.get(7 + level)?;
        }

        Some(PageMetadata {
            analysis: PageAnalysis {
                title: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                html_version: html_version
                    .as_deref()
                    .map(HtmlVersion::from_label)
                    .unwrap_or(HtmlVersion::Unknown),
                headings,
                internal_links: row.get(13)?,
                external_links: row.get(14)?,
                has_login_form: row.get(16)?,
            },
            broken_links: row.get(15)?,
        })
    } else {
        None
    };

    let error_message = if status == JobStatus::Error {
        row.get(17)?
    } else {
        None
    };

    Ok(JobRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        status,
        created_at: row.get(3)?,
        last_crawled_at: row.get(4)?,
        metadata,
        error_message,
    })
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, url: &str) -> StorageResult<JobRecord> {
        if self.get_job_by_url(url)?.is_some() {
            return Err(StorageError::DuplicateUrl(url.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs (id, url, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, url, JobStatus::Pending.to_db_string(), now],
        )?;

        Ok(JobRecord {
            id,
            url: url.to_string(),
            status: JobStatus::Pending,
            created_at: now,
            last_crawled_at: None,
            metadata: None,
            error_message: None,
        })
    }

    fn get_job(&self, job_id: &str) -> StorageResult<Option<JobRecord>> {
        self.query_job("id", job_id)
    }

    fn get_job_by_url(&self, url: &str) -> StorageResult<Option<JobRecord>> {
        self.query_job("url", url)
    }

    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        // rowid follows insertion order
        let sql = format!("SELECT {} FROM jobs ORDER BY rowid DESC", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn delete_job(&mut self, job_id: &str) -> StorageResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        Ok(changed > 0)
    }

    // ===== Status Transitions =====

    fn set_status(&mut self, job_id: &str, status: JobStatus) -> StorageResult<()> {
        let changed = if status == JobStatus::Crawling {
            self.conn.execute(
                "UPDATE jobs SET status = ?1, error_message = NULL WHERE id = ?2",
                params![status.to_db_string(), job_id],
            )?
        } else {
            let now = Utc::now().to_rfc3339();
            self.conn.execute(
                "UPDATE jobs SET status = ?1, last_crawled_at = ?2 WHERE id = ?3",
                params![status.to_db_string(), now, job_id],
            )?
        };

        Self::require_updated(job_id, changed)
    }

    fn set_error(&mut self, job_id: &str, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2, last_crawled_at = ?3 WHERE id = ?4",
            params![JobStatus::Error.to_db_string(), message, now, job_id],
        )?;

        Self::require_updated(job_id, changed)
    }

    fn save_metadata(&mut self, job_id: &str, metadata: &PageMetadata) -> StorageResult<()> {
        let analysis = &metadata.analysis;
        let h = &analysis.headings.0;
        let now = Utc::now().to_rfc3339();

        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, last_crawled_at = ?2, title = ?3, html_version = ?4,
             h1_count = ?5, h2_count = ?6, h3_count = ?7, h4_count = ?8, h5_count = ?9, h6_count = ?10,
             internal_links = ?11, external_links = ?12, broken_links = ?13, has_login_form = ?14,
             error_message = NULL
             WHERE id = ?15",
            params![
                JobStatus::Completed.to_db_string(),
                now,
                analysis.title,
                analysis.html_version.as_str(),
                h[0],
                h[1],
                h[2],
                h[3],
                h[4],
                h[5],
                analysis.internal_links,
                analysis.external_links,
                metadata.broken_links,
                analysis.has_login_form,
                job_id
            ],
        )?;

        Self::require_updated(job_id, changed)
    }

    // ===== Broken Links =====

    fn append_broken_link(&mut self, job_id: &str, link: &BrokenLink) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO broken_links (job_id, link_url, status_code, error_message, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, link.url, link.status_code, link.error, now],
        )?;
        Ok(())
    }

    fn clear_broken_links(&mut self, job_id: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM broken_links WHERE job_id = ?1", params![job_id])?;
        Ok(())
    }

    fn get_broken_links(&self, job_id: &str) -> StorageResult<Vec<BrokenLinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, link_url, status_code, error_message, discovered_at
             FROM broken_links WHERE job_id = ?1 ORDER BY id ASC",
        )?;

        let links = stmt
            .query_map(params![job_id], |row| {
                Ok(BrokenLinkRecord {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    link_url: row.get(2)?,
                    status_code: row.get(3)?,
                    error_message: row.get(4)?,
                    discovered_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    // ===== Statistics =====

    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>> {
        let mut counts: HashMap<JobStatus, u64> =
            JobStatus::all().into_iter().map(|s| (s, 0)).collect();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            match JobStatus::from_db_string(&status) {
                Some(status) => {
                    counts.insert(status, count as u64);
                }
                None => {
                    return Err(StorageError::Database(format!(
                        "unknown job status {:?}",
                        status
                    )))
                }
            }
        }

        Ok(counts)
    }
}
