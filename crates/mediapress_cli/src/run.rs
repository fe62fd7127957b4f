//! `mediapress run`: compress the site tree.
//!
//! 1. Resolve configuration (file, then command-line overrides)
//! 2. Run the scheduler with the system transcoders
//! 3. Report the summary
//!
//! Per-file failures are reported but do not change the exit code; only a
//! run that could not complete exits non-zero.

use mediapress_compress::{RunPaths, Scheduler, Transcoders};
use mediapress_config::{validate_compression, validate_layout, MediaPressConfig};

use crate::project::{override_path, resolve_config};
use crate::{GlobalArgs, RunArgs};

/// Runs the `mediapress run` command.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let project = resolve_config(global, &cwd)?;
    let mut config = project.config;
    apply_overrides(&mut config, args, &cwd)?;
    validate_layout(&config, Some(&project.root))?;

    let scheduler = Scheduler::new(
        RunPaths::from_config(&config),
        config.compression.clone(),
        Transcoders::system(),
    );
    let report = scheduler.run()?;

    if !global.quiet {
        for failure in &report.failures {
            eprintln!("warning: {} left uncompressed: {}", failure.path.display(), failure.reason);
        }
        let saved = report.stats.bytes_before.saturating_sub(report.stats.bytes_after);
        println!("{} ({} bytes saved)", report.stats, saved);
    }
    if let Some(reason) = &report.persist_error {
        eprintln!("warning: cache manifest not saved: {reason}");
    }
    Ok(0)
}

/// Merges command-line overrides into the loaded configuration.
fn apply_overrides(
    config: &mut MediaPressConfig,
    args: &RunArgs,
    cwd: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    override_path(&mut config.site_dir, args.site_dir.as_ref(), cwd);
    override_path(&mut config.cache_dir, args.cache_dir.as_ref(), cwd);
    if let Some(out) = &args.output_dir {
        config.output_dir = Some(cwd.join(out));
    }
    if let Some(jobs) = args.jobs {
        config.compression.max_workers = jobs;
    }
    validate_compression(&config.compression)?;
    Ok(())
}
