//! Content-hash compression cache.
//!
//! This crate hashes site media files, maps their digests to previously
//! compressed artifacts, and keeps the on-disk manifest consistent across
//! builds: it is discarded wholesale when the compression settings change,
//! pruned of orphans after every run, and always replaced atomically.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod gc;
pub mod hasher;
pub mod manifest;
pub mod store;

pub use artifact::{copy_atomic, ArtifactStore};
pub use error::CacheError;
pub use hasher::SourceHasher;
pub use manifest::{write_atomic, CacheEntry, CacheManifest, LoadOutcome, MANIFEST_FILE};
pub use store::CacheStore;
