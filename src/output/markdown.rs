//! Markdown job reports
//!
//! This module renders one crawl job, with its page metadata and broken
//! links, as a human-readable markdown document.

use crate::state::JobStatus;
use crate::storage::{BrokenLinkRecord, JobRecord};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a job to `output_path`
///
/// # Arguments
///
/// * `job` - The job to report on
/// * `broken_links` - Broken links recorded for the job
/// * `output_path` - Path where the markdown file should be written
pub fn write_job_report(
    job: &JobRecord,
    broken_links: &[BrokenLinkRecord],
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_job_report(job, broken_links);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a job report as markdown
pub fn format_job_report(job: &JobRecord, broken_links: &[BrokenLinkRecord]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Crawl Report: {}\n\n", job.url));

    md.push_str("## Job\n\n");
    md.push_str(&format!("- **ID**: {}\n", job.id));
    md.push_str(&format!("- **Status**: {}\n", job.status));
    md.push_str(&format!("- **Created**: {}\n", job.created_at));
    if let Some(crawled) = &job.last_crawled_at {
        md.push_str(&format!("- **Last Crawled**: {}\n", crawled));
    }
    if let Some(error) = &job.error_message {
        md.push_str(&format!("- **Error**: {}\n", error));
    }
    md.push('\n');

    let Some(metadata) = &job.metadata else {
        if job.status != JobStatus::Completed {
            md.push_str("_No page metadata: the job has not completed._\n");
        }
        return md;
    };
    let analysis = &metadata.analysis;

    md.push_str("## Page\n\n");
    let title = if analysis.title.is_empty() {
        "(none)"
    } else {
        analysis.title.as_str()
    };
    md.push_str(&format!("- **Title**: {}\n", title));
    md.push_str(&format!("- **HTML Version**: {}\n", analysis.html_version));
    md.push_str(&format!(
        "- **Login Form**: {}\n\n",
        if analysis.has_login_form { "yes" } else { "no" }
    ));

    md.push_str("## Headings\n\n");
    md.push_str("| Level | Count |\n");
    md.push_str("|-------|-------|\n");
    for level in 1..=6 {
        md.push_str(&format!(
            "| h{} | {} |\n",
            level,
            analysis.headings.level(level)
        ));
    }
    md.push('\n');

    md.push_str("## Links\n\n");
    md.push_str(&format!("- **Internal**: {}\n", analysis.internal_links));
    md.push_str(&format!("- **External**: {}\n", analysis.external_links));
    md.push_str(&format!("- **Broken**: {}\n\n", metadata.broken_links));

    if !broken_links.is_empty() {
        md.push_str("## Broken Links\n\n");
        md.push_str("| URL | Status | Error |\n");
        md.push_str("|-----|--------|-------|\n");
        for link in broken_links {
            let status = if link.status_code == 0 {
                "-".to_string()
            } else {
                link.status_code.to_string()
            };
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                link.link_url,
                status,
                link.error_message.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
