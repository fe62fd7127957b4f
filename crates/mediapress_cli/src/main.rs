//! MediaPress CLI: cache-aware media compression for built site trees.
//!
//! Provides `mediapress run` to compress every image and video in a site
//! directory, `mediapress clean` to empty the compression cache, and
//! `mediapress status` to inspect the cache against the current settings.

#![warn(missing_docs)]

mod clean;
mod logging;
mod project;
mod run;
mod status;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// MediaPress: compress site media once, reuse it on every build.
#[derive(Parser, Debug)]
#[command(name = "mediapress", version, about = "Cache-aware media compression")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `mediapress.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress every media file in the site directory.
    Run(RunArgs),
    /// Delete all cached artifacts and the manifest.
    Clean(CleanArgs),
    /// Report what the cache holds and whether it is still valid.
    Status(StatusArgs),
}

/// Arguments for the `mediapress run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Build output directory to compress (overrides `site_dir`).
    #[arg(long)]
    pub site_dir: Option<PathBuf>,

    /// Cache directory (overrides `cache_dir`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Write results to this directory instead of rewriting the site in place.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of compression workers (overrides `compression.max_workers`).
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for the `mediapress clean` subcommand.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Cache directory (overrides `cache_dir`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for the `mediapress status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Cache directory (overrides `cache_dir`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    if let Err(e) = logging::init(&global) {
        eprintln!("warning: logging disabled: {e}");
    }

    let result = match cli.command {
        Command::Run(ref args) => run::run(args, &global),
        Command::Clean(ref args) => clean::run(args, &global),
        Command::Status(ref args) => status::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
