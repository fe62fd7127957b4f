//! Parsing and validation of `mediapress.toml` configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`MediaPressConfig`], plus the [`ConfigSnapshot`] of compression settings
//! that the cache manifest is keyed on.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod snapshot;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    check_cache_dir, load_config, load_config_file, load_config_from_str, resolve_paths,
    validate_compression, validate_layout, CONFIG_FILE,
};
pub use snapshot::{ConfigChange, ConfigSnapshot};
pub use types::*;
