//! Crawler module for page fetching and analysis
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and HTML parsing
//! - Structural analysis of a fetched page
//! - Bounded-parallel broken-link checks
//! - The job registry and the engine that runs cancellable crawls

mod analyzer;
mod engine;
mod fetcher;
mod parser;
mod registry;
mod scanner;

pub use analyzer::{
    analyze_document, classify_link, HeadingCounts, HtmlVersion, LinkScope, PageAnalysis,
    PageMetadata,
};
pub use engine::CrawlEngine;
pub use fetcher::{build_http_client, fetch_page, FetchedPage};
pub use parser::parse_document;
pub use registry::{JobRegistry, RunHandle};
pub use scanner::{
    check_all, check_link, classify_status, collect_link_targets, scan_links, BrokenLink,
};
