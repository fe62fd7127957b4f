//! `mediapress status`: inspect the cache against the current settings.

use std::fmt;

use mediapress_cache::{CacheManifest, LoadOutcome};
use mediapress_config::ConfigSnapshot;

use crate::project::{override_path, resolve_config};
use crate::{GlobalArgs, StatusArgs};

/// Summary of a cache directory as seen by the current configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// Entries that would be reused.
    pub entries: usize,
    /// Total original bytes of those entries.
    pub original_bytes: u64,
    /// Total artifact bytes of those entries.
    pub cached_bytes: u64,
    /// How the manifest loaded.
    pub outcome: LoadOutcome,
}

impl CacheStatus {
    /// Builds the status from a loaded manifest.
    pub fn from_manifest(manifest: &CacheManifest, outcome: LoadOutcome) -> Self {
        let (original_bytes, cached_bytes) = manifest
            .entries()
            .fold((0, 0), |(o, c), e| (o + e.original_size, c + e.compressed_size));
        Self {
            entries: manifest.len(),
            original_bytes,
            cached_bytes,
            outcome,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            LoadOutcome::Missing => write!(f, "no cache manifest"),
            LoadOutcome::Unreadable { reason } => {
                write!(f, "cache manifest unreadable, next run starts fresh: {reason}")
            }
            LoadOutcome::Invalidated { changes } => {
                writeln!(f, "stale: settings changed, next run recompresses everything")?;
                for change in changes {
                    writeln!(f, "  {}: {} → {}", change.field, change.old, change.new)?;
                }
                Ok(())
            }
            LoadOutcome::Reused { .. } => write!(
                f,
                "{} entries, {} bytes cached for {} original bytes",
                self.entries, self.cached_bytes, self.original_bytes
            ),
        }
    }
}

/// Runs the `mediapress status` command.
pub fn run(args: &StatusArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let mut config = resolve_config(global, &cwd)?.config;
    override_path(&mut config.cache_dir, args.cache_dir.as_ref(), &cwd);

    let snapshot = ConfigSnapshot::capture(&config.compression);
    let (manifest, outcome) = CacheManifest::load(&config.cache_dir, &snapshot);
    let status = CacheStatus::from_manifest(&manifest, outcome);

    println!("{}: {}", config.cache_dir.display(), status);
    Ok(0)
}
