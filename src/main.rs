//! Sitelens main entry point
//!
//! This is the command-line interface for the Sitelens crawl engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sitelens::config::{load_config_with_hash, Config};
use sitelens::output::{format_job_report, format_job_table, load_statistics, print_statistics};
use sitelens::storage::{open_storage, SqliteStorage, Storage};
use sitelens::CrawlEngine;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Sitelens: page crawls with structural analysis and broken-link checks
///
/// Each submitted URL becomes a job. Crawling a job fetches the page,
/// records its title, HTML version, heading counts, link counts and
/// login-form presence, then checks every link on it.
#[derive(Parser, Debug)]
#[command(name = "sitelens")]
#[command(version)]
#[command(about = "Cancellable page crawls with broken-link checks", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register URLs as new crawl jobs
    Add {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Crawl the new jobs right away
        #[arg(long)]
        crawl: bool,
    },

    /// Crawl jobs and wait for them to finish (Ctrl-C stops them)
    Crawl {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List all jobs, newest first
    List,

    /// Show one job with its metadata and broken links
    Show {
        id: String,

        /// Write the report to a markdown file instead of stdout
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Delete a job and its broken links
    Delete { id: String },

    /// Show job statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;

    match cli.command {
        Command::Add { urls, crawl } => handle_add(&config, storage, &urls, crawl).await,
        Command::Crawl { ids } => {
            let engine = CrawlEngine::from_config(storage, &config)?;
            handle_crawl(&engine, &ids).await
        }
        Command::List => {
            print!("{}", format_job_table(&storage.list_jobs()?));
            Ok(())
        }
        Command::Show { id, report } => handle_show(&storage, &id, report.as_deref()),
        Command::Delete { id } => handle_delete(storage, &id),
        Command::Stats => {
            print_statistics(&load_statistics(&storage)?);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitelens=info,warn"),
            1 => EnvFilter::new("sitelens=debug,info"),
            2 => EnvFilter::new("sitelens=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn handle_add(
    config: &Config,
    mut storage: SqliteStorage,
    urls: &[String],
    crawl: bool,
) -> Result<()> {
    let mut ids = Vec::with_capacity(urls.len());

    for raw in urls {
        let url = Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Only http and https URLs can be crawled: {}", raw);
        }

        let job = storage.create_job(url.as_str())?;
        println!("{}  {}", job.id, job.url);
        ids.push(job.id);
    }

    if crawl {
        let engine = CrawlEngine::from_config(storage, config)?;
        handle_crawl(&engine, &ids).await?;
    }

    Ok(())
}

/// Starts every job, then waits for all of them; Ctrl-C stops the rest
async fn handle_crawl(engine: &CrawlEngine<SqliteStorage>, ids: &[String]) -> Result<()> {
    let mut started = Vec::with_capacity(ids.len());
    for id in ids {
        match engine.start_crawl(id) {
            Ok(()) => started.push(id.as_str()),
            Err(e) => tracing::error!("Cannot start job {}: {}", id, e),
        }
    }

    let all_finished = async {
        for id in &started {
            engine.wait_for(id).await;
        }
    };

    tokio::select! {
        _ = all_finished => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Interrupted, stopping running jobs");
            for id in engine.shutdown() {
                engine.stop_crawl(&id);
                engine.wait_for(&id).await;
            }
        }
    }

    let storage = engine.storage();
    let storage = storage
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    for id in &started {
        if let Some(job) = storage.get_job(id)? {
            println!("{}  {:<9}  {}", job.id, job.status.to_db_string(), job.url);
        }
    }

    Ok(())
}

fn handle_show(storage: &SqliteStorage, id: &str, report: Option<&Path>) -> Result<()> {
    let Some(job) = storage.get_job(id)? else {
        bail!("Crawl job not found: {}", id);
    };
    let broken_links = storage.get_broken_links(id)?;

    match report {
        Some(path) => {
            sitelens::output::write_job_report(&job, &broken_links, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Report written to: {}", path.display());
        }
        None => print!("{}", format_job_report(&job, &broken_links)),
    }

    Ok(())
}

fn handle_delete(mut storage: SqliteStorage, id: &str) -> Result<()> {
    if !storage.delete_job(id)? {
        bail!("Crawl job not found: {}", id);
    }
    println!("Deleted job {}", id);
    Ok(())
}
