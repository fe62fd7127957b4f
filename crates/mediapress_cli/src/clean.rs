//! `mediapress clean`: empty the compression cache.

use mediapress_cache::CacheStore;
use mediapress_config::validate_layout;

use crate::project::{override_path, resolve_config};
use crate::{CleanArgs, GlobalArgs};

/// Runs the `mediapress clean` command.
///
/// Deletes the manifest and every artifact. Other files in the cache
/// directory are left alone.
pub fn run(args: &CleanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let project = resolve_config(global, &cwd)?;
    let mut config = project.config;
    override_path(&mut config.cache_dir, args.cache_dir.as_ref(), &cwd);
    validate_layout(&config, Some(&project.root))?;

    CacheStore::clear(&config.cache_dir)?;
    tracing::info!(cache_dir = %config.cache_dir.display(), "cache cleared");
    if !global.quiet {
        println!("Cleared {}", config.cache_dir.display());
    }
    Ok(0)
}
