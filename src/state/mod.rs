//! State module for tracking crawl job progress
//!
//! - `JobStatus`: the persisted lifecycle status of a crawl job

mod job_status;

pub use job_status::JobStatus;
