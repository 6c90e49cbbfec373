//! Configuration module for Sitelens
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sitelens::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitelens.toml")).unwrap();
//! println!("Link checks in flight: {}", config.crawler.max_concurrent_checks);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
