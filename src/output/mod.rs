//! Output module for job reports and statistics
//!
//! This module handles:
//! - Rendering markdown reports of a single job
//! - Listing jobs as a table
//! - Summarizing job statistics

mod markdown;
pub mod stats;

pub use markdown::{format_job_report, write_job_report};
pub use stats::{load_statistics, print_statistics, JobStatistics};

use crate::storage::JobRecord;

/// Formats jobs as a fixed-width table, one line per job
pub fn format_job_table(jobs: &[JobRecord]) -> String {
    let mut table = format!("{:<36}  {:<9}  {}\n", "ID", "STATUS", "URL");

    for job in jobs {
        table.push_str(&format!(
            "{:<36}  {:<9}  {}\n",
            job.id,
            job.status.to_db_string(),
            job.url
        ));
    }

    table
}
