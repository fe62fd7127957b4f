//! Locating and loading the project configuration.

use std::path::{Path, PathBuf};

use mediapress_config::{resolve_paths, validate_layout, MediaPressConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// A loaded configuration and the directory it belongs to.
#[derive(Debug)]
pub struct Project {
    /// Configuration with every path resolved.
    pub config: MediaPressConfig,
    /// Directory holding the configuration file, or the working directory
    /// when running on defaults.
    pub root: PathBuf,
}

/// Walks up from `start` looking for the nearest `mediapress.toml`.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Loads the configuration selected by the global flags.
///
/// `--config` may name a file or a directory containing `mediapress.toml`.
/// Without it, the nearest `mediapress.toml` above `cwd` is used; if there is
/// none, defaults rooted at `cwd` apply.
pub fn resolve_config(global: &GlobalArgs, cwd: &Path) -> Result<Project, Box<dyn std::error::Error>> {
    let file = match &global.config {
        Some(path) => {
            let path = cwd.join(path);
            if path.is_dir() {
                path.join(CONFIG_FILE)
            } else {
                path
            }
        }
        None => match find_config_file(cwd) {
            Some(file) => {
                tracing::debug!(config = %file.display(), "using configuration file");
                file
            }
            None => {
                tracing::debug!("no {CONFIG_FILE} found, using defaults");
                let mut config = MediaPressConfig::default();
                resolve_paths(&mut config, cwd);
                validate_layout(&config, Some(cwd))?;
                return Ok(Project {
                    config,
                    root: cwd.to_path_buf(),
                });
            }
        },
    };

    let config = mediapress_config::load_config_file(&file)?;
    let root = file.parent().unwrap_or(cwd).to_path_buf();
    Ok(Project { config, root })
}

/// Applies a command-line path override, resolved against `cwd`.
pub fn override_path(target: &mut PathBuf, value: Option<&PathBuf>, cwd: &Path) {
    if let Some(value) = value {
        *target = cwd.join(value);
    }
}
