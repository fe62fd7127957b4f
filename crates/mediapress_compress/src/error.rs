//! Error types for transcoding and scheduling.

use std::path::PathBuf;

use mediapress_cache::CacheError;
use mediapress_config::ConfigError;

/// A single file could not be compressed.
///
/// Always recovered at the file level: the original is passed through and the
/// run's error counter is incremented.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Reading the source or writing a scratch file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file's format is not handled by this transcoder.
    #[error("unsupported format: {path}")]
    UnsupportedFormat {
        /// The source file.
        path: PathBuf,
    },

    /// The source could not be decoded.
    #[error("failed to decode {path}: {reason}")]
    Decode {
        /// The source file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The compressed output could not be encoded.
    #[error("failed to encode {path}: {reason}")]
    Encode {
        /// The source file.
        path: PathBuf,
        /// Encoder message.
        reason: String,
    },

    /// An external tool is not installed.
    #[error("{tool} not found on PATH")]
    ToolNotFound {
        /// Program name.
        tool: String,
    },

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        /// Program name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Tail of the tool's standard error.
        stderr: String,
    },

    /// The transcoder produced no output for a non-empty source.
    #[error("no output produced for {path}")]
    EmptyOutput {
        /// The source file.
        path: PathBuf,
    },
}

/// A failure that aborts a whole run.
///
/// Per-file problems never surface here; they are counted in the run
/// statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The cache directory cannot be created or used.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The cache directory overlaps the site or output directory.
    #[error(transparent)]
    Layout(#[from] ConfigError),

    /// The site directory cannot be read.
    #[error("cannot read site directory {path}: {source}")]
    SiteDir {
        /// The site directory.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}
