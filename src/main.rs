//! CLI entry point for linkdrop.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use indicatif::{MultiProgress, ProgressDrawTarget};
use linkdrop_core::{EngineConfig, JobEngine, JobId, JobStatus};
use tracing::{debug, info};

mod cli;
mod output;

use cli::{Cli, Command, FetchArgs};

/// Process outcome, mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// Everything requested finished.
    Success,
    /// Some jobs finished, some did not.
    Partial,
    /// Nothing finished.
    Failure,
}

impl ProcessExit {
    fn code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Failure => ExitCode::FAILURE,
            Self::Partial => ExitCode::from(2),
        }
    }
}

/// Maps completed and failed job counts to the process exit outcome.
fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    debug!(?cli, "CLI arguments parsed");

    let config = EngineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let exit = match &cli.command {
        Command::Fetch(args) => run_fetch(config, args, cli.quiet).await?,
        Command::Resume { ids } => run_resume(config, ids, cli.quiet).await?,
        Command::List => run_list(config).await?,
        Command::Clean => run_clean(config).await?,
    };
    Ok(exit.code())
}

/// Installs the log subscriber.
///
/// Priority: `RUST_LOG` > quiet flag > verbose flag > default (info).
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_fetch(config: EngineConfig, args: &FetchArgs, quiet: bool) -> Result<ProcessExit> {
    let engine = JobEngine::builder(config).build().await?;

    let mut ids = Vec::with_capacity(args.urls.len());
    let mut rejected = 0usize;
    for url in &args.urls {
        match engine.submit(url, args.dest.as_deref()).await {
            Ok(record) => ids.push(record.id),
            Err(e) => {
                eprintln!("rejected {url}: {e}");
                rejected += 1;
            }
        }
    }
    info!(queued = ids.len(), rejected, "links submitted");

    let tally = watch_jobs(&engine, &ids, quiet).await?;
    engine.shutdown().await;
    Ok(determine_exit_outcome(tally.completed, tally.failed + rejected))
}

async fn run_resume(config: EngineConfig, ids: &[JobId], quiet: bool) -> Result<ProcessExit> {
    let engine = JobEngine::builder(config).build().await?;

    let mut resumed = Vec::with_capacity(ids.len());
    let mut refused = 0usize;
    for &id in ids {
        match engine.resume(id).await {
            Ok(_) => resumed.push(id),
            Err(e) => {
                eprintln!("cannot resume {id}: {e}");
                refused += 1;
            }
        }
    }

    let tally = watch_jobs(&engine, &resumed, quiet).await?;
    engine.shutdown().await;
    Ok(determine_exit_outcome(tally.completed, tally.failed + refused))
}

async fn run_list(config: EngineConfig) -> Result<ProcessExit> {
    if config.storage.database_path.is_none() {
        println!("No job database configured (storage.database_path); nothing to list.");
        return Ok(ProcessExit::Success);
    }
    let engine = JobEngine::builder(config).dispatch(false).build().await?;
    let records = engine.list();
    if records.is_empty() {
        println!("No jobs.");
    }
    let width = output::terminal_width();
    for record in &records {
        println!("{}", output::render_job_row(record, width));
    }
    engine.shutdown().await;
    Ok(ProcessExit::Success)
}

async fn run_clean(config: EngineConfig) -> Result<ProcessExit> {
    let engine = JobEngine::builder(config).dispatch(false).build().await?;
    let removed = engine.clean_completed().await;
    println!("Removed {removed} finished job(s).");
    engine.shutdown().await;
    Ok(ProcessExit::Success)
}

/// Counts of watched jobs by outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    completed: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, status: Option<JobStatus>) {
        match status {
            Some(JobStatus::Success) => self.completed += 1,
            _ => self.failed += 1,
        }
    }
}

/// Renders one bar per job until every job is terminal.
///
/// Ctrl-C pauses running jobs through an engine shutdown; they can be
/// continued later with `resume`.
async fn watch_jobs(engine: &JobEngine, ids: &[JobId], quiet: bool) -> Result<Tally> {
    let multi = MultiProgress::new();
    if quiet {
        multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut watchers = Vec::with_capacity(ids.len());
    for &id in ids {
        let mut updates = engine.subscribe(id)?;
        let bar = multi.add(output::job_progress_bar(&updates.borrow(), quiet));
        watchers.push(async move {
            loop {
                let record = updates.borrow_and_update().clone();
                output::update_progress_bar(&bar, &record);
                if record.status().is_terminal() {
                    bar.finish_with_message(output::final_message(&record));
                    return Some(record.status());
                }
                if updates.changed().await.is_err() {
                    bar.abandon();
                    return None;
                }
            }
        });
    }

    tokio::select! {
        statuses = join_all(watchers) => {
            let mut tally = Tally::default();
            for status in statuses {
                tally.add(status);
            }
            Ok(tally)
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            eprintln!("Interrupted; pausing running jobs...");
            engine.shutdown().await;

            let mut tally = Tally::default();
            for &id in ids {
                let status = engine.get(id).ok().map(|record| record.status());
                if status == Some(JobStatus::Paused) {
                    eprintln!("paused {id}; continue with `linkdrop resume {id}`");
                }
                tally.add(status);
            }
            Ok(tally)
        }
    }
}
