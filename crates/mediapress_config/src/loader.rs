//! Configuration file loading and validation.

use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;
use crate::types::{CompressionConfig, MediaPressConfig};

/// File name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "mediapress.toml";

/// Loads and validates `<project_dir>/mediapress.toml`.
///
/// Relative paths in the file are resolved against `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<MediaPressConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
///
/// Relative paths in the file are resolved against the file's parent directory.
pub fn load_config_file(path: &Path) -> Result<MediaPressConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = load_config_from_str(&content)?;
    if let Some(base) = path.parent() {
        resolve_paths(&mut config, base);
        validate_layout(&config, Some(base))?;
    }
    Ok(config)
}

/// Parses and validates a `mediapress.toml` configuration from a string.
///
/// Paths are left as written. Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<MediaPressConfig, ConfigError> {
    let config: MediaPressConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_compression(&config.compression)?;
    Ok(config)
}

/// Makes every relative path in `config` relative to `base` instead.
pub fn resolve_paths(config: &mut MediaPressConfig, base: &Path) {
    if config.site_dir.is_relative() {
        config.site_dir = base.join(&config.site_dir);
    }
    if config.cache_dir.is_relative() {
        config.cache_dir = base.join(&config.cache_dir);
    }
    if let Some(out) = config.output_dir.as_mut() {
        if out.is_relative() {
            *out = base.join(&*out);
        }
    }
}

/// Checks that the cache directory cannot swallow other project files.
///
/// Artifacts are swept from the cache directory, so it must not be, or
/// contain, the site directory, the output directory, or `project_dir` (the
/// directory holding the configuration file).
pub fn validate_layout(
    config: &MediaPressConfig,
    project_dir: Option<&Path>,
) -> Result<(), ConfigError> {
    let mut protected = vec![("site_dir", config.site_dir.as_path())];
    if let Some(out) = &config.output_dir {
        protected.push(("output_dir", out.as_path()));
    }
    if let Some(dir) = project_dir {
        protected.push(("the project directory", dir));
    }
    check_cache_dir(&config.cache_dir, &protected)
}

/// Fails if `cache_dir` is equal to, or an ancestor of, any named path.
pub fn check_cache_dir(cache_dir: &Path, protected: &[(&str, &Path)]) -> Result<(), ConfigError> {
    let cache = normalize(cache_dir);
    for (name, path) in protected {
        if normalize(path).starts_with(&cache) {
            return Err(ConfigError::ValidationError(format!(
                "cache_dir {} must not be or contain {name} ({})",
                cache_dir.display(),
                path.display()
            )));
        }
    }
    Ok(())
}

/// Resolves `.` and `..` lexically, then follows symlinks through the part
/// of the path that already exists.
fn normalize(path: &Path) -> PathBuf {
    let mut lexical = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    while !existing.as_os_str().is_empty() && !existing.exists() {
        let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
            break;
        };
        missing.push(name);
        existing = parent;
    }
    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(missing.iter().rev());
    resolved
}

/// Checks that every compression tunable is within its documented range.
pub fn validate_compression(config: &CompressionConfig) -> Result<(), ConfigError> {
    if !(1..=100).contains(&config.image_quality) {
        return Err(ConfigError::ValidationError(format!(
            "image_quality must be between 1 and 100, got {}",
            config.image_quality
        )));
    }
    if config.video_crf > 51 {
        return Err(ConfigError::ValidationError(format!(
            "video_crf must be between 0 and 51, got {}",
            config.video_crf
        )));
    }
    for (name, value) in [
        ("image_max_width", config.image_max_width),
        ("image_max_height", config.image_max_height),
        ("video_max_width", config.video_max_width),
    ] {
        if value == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be a positive integer"
            )));
        }
    }
    if config.max_workers == 0 {
        return Err(ConfigError::ValidationError(
            "max_workers must be at least 1".to_string(),
        ));
    }
    Ok(())
}
