//! Parallel, cache-aware media compression for built site trees.
//!
//! This crate provides the [`Scheduler`] that drives a run, the
//! [`Transcoder`] trait that abstracts over compression backends, and the
//! default backends: [`ImageTranscoder`] (the `image` crate) and
//! [`FfmpegTranscoder`] (an external `ffmpeg`).
//!
//! # Usage
//!
//! ```no_run
//! use mediapress_compress::{RunPaths, Scheduler, Transcoders};
//! use mediapress_config::MediaPressConfig;
//!
//! let config = MediaPressConfig::default();
//! let scheduler = Scheduler::new(
//!     RunPaths::from_config(&config),
//!     config.compression.clone(),
//!     Transcoders::system(),
//! );
//! let report = scheduler.run().unwrap();
//! println!("{}", report.stats);
//! ```
//!
//! Running twice over an unchanged tree compresses nothing the second time:
//! every file is served from the cache keyed by its SHA-256 digest.

#![warn(missing_docs)]

pub mod error;
pub mod scan;
pub mod scheduler;
pub mod stats;
pub mod transcode;

pub use error::{CompressionError, RunError};
pub use scan::{scan_site, Candidate, SiteScan};
pub use scheduler::{FileFailure, RunPaths, RunPhase, RunReport, Scheduler, WorkItem};
pub use stats::{reduction_line, RunStats, StatsSummary};
pub use transcode::{
    CompressedOutput, FfmpegTranscoder, ImageTranscoder, ScratchFile, Transcoder, Transcoders,
};
