//! Shared foundational types used across the mediapress workspace.
//!
//! This crate provides the content digest used as the compression cache key
//! and the media-kind classification of site files.

#![warn(missing_docs)]

pub mod digest;
pub mod media;

pub use digest::{ContentDigest, ParseDigestError, DIGEST_LEN};
pub use media::{MediaKind, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
