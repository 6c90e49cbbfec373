//! Statistics generation from the job database
//!
//! This module provides functionality for extracting and displaying
//! job statistics from the storage layer.

use crate::state::JobStatus;
use crate::storage::Storage;
use crate::SitelensError;
use std::collections::HashMap;

/// Job statistics summary
#[derive(Debug, Clone)]
pub struct JobStatistics {
    /// Total number of registered jobs
    pub total_jobs: u64,

    /// Count of jobs by status; every status is present
    pub jobs_by_status: HashMap<JobStatus, u64>,

    /// Broken links summed over completed jobs
    pub total_broken_links: u64,
}

impl JobStatistics {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of finished jobs that completed, as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished: u64 = JobStatus::all()
            .into_iter()
            .filter(JobStatus::is_terminal)
            .map(|s| self.count(s))
            .sum();

        if finished == 0 {
            0.0
        } else {
            (self.count(JobStatus::Completed) as f64 / finished as f64) * 100.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(JobStatistics)` - Successfully loaded statistics
/// * `Err(SitelensError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<JobStatistics, SitelensError> {
    let jobs_by_status = storage.count_jobs_by_status()?;
    let total_jobs = jobs_by_status.values().sum();

    let total_broken_links = storage
        .list_jobs()?
        .iter()
        .filter_map(|job| job.metadata.as_ref())
        .map(|metadata| u64::from(metadata.broken_links))
        .sum();

    Ok(JobStatistics {
        total_jobs,
        jobs_by_status,
        total_broken_links,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &JobStatistics) {
    println!("=== Job Statistics ===\n");

    println!("Jobs by Status:");
    for status in JobStatus::all() {
        let count = stats.count(status);
        let percentage = if stats.total_jobs > 0 {
            (count as f64 / stats.total_jobs as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Total jobs: {}", stats.total_jobs);
    println!("Broken links found: {}", stats.total_broken_links);
    println!("Success Rate: {:.1}%", stats.success_rate());
}
