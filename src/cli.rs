//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use linkdrop_core::JobId;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "linkdrop.toml";

/// Fetch file-host links into allow-listed folders.
///
/// Downloads are resumable jobs: they survive stalls, pauses and restarts,
/// and finished files trigger a media library rescan when configured.
#[derive(Parser, Debug)]
#[command(name = "linkdrop")]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit links and wait for their downloads
    Fetch(FetchArgs),

    /// Resume paused jobs by id and wait for them
    Resume {
        /// Job ids as printed by `list`
        #[arg(required = true)]
        ids: Vec<JobId>,
    },

    /// Show persisted jobs
    List,

    /// Remove finished, failed and canceled jobs
    Clean,
}

/// Arguments for `fetch`.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Links to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Destination folder (must lie under a configured root)
    #[arg(short, long)]
    pub dest: Option<PathBuf>,
}
