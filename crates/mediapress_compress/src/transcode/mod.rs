//! Transcoder adapters: the per-media-family compression backends.
//!
//! The scheduler only sees the [`Transcoder`] trait. Which implementation
//! handles a file is decided by its [`MediaKind`] through [`Transcoders`].

mod raster;
mod video;

use std::path::{Path, PathBuf};

use mediapress_common::MediaKind;
use mediapress_config::CompressionConfig;

use crate::error::CompressionError;

pub use self::raster::ImageTranscoder;
pub use self::video::FfmpegTranscoder;

/// A compressed artifact as handed back by a [`Transcoder`].
#[derive(Debug)]
pub enum CompressedOutput {
    /// Encoded in memory.
    Bytes(Vec<u8>),
    /// Written to a scratch file, deleted when this value is dropped.
    File(ScratchFile),
}

impl CompressedOutput {
    /// Reads the artifact into memory.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(file) => std::fs::read(file.path()),
        }
    }
}

impl From<Vec<u8>> for CompressedOutput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// An output file inside a temporary directory owned by this value.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl ScratchFile {
    /// Takes ownership of `dir`, which must contain `path`.
    pub fn new(dir: tempfile::TempDir, path: PathBuf) -> Self {
        Self { path, _dir: dir }
    }

    /// Location of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Produces a compressed artifact from a source file.
///
/// Implementations must be pure with respect to their inputs: the same source
/// bytes and the same settings must yield functionally equivalent output,
/// since the cache assumes artifacts depend on nothing else.
pub trait Transcoder: Send + Sync {
    /// Compresses `source` and returns the artifact.
    ///
    /// The output format is chosen by the extension of `source`.
    fn compress(
        &self,
        source: &Path,
        config: &CompressionConfig,
    ) -> Result<CompressedOutput, CompressionError>;
}

/// One transcoder per media family.
pub struct Transcoders {
    image: Box<dyn Transcoder>,
    video: Box<dyn Transcoder>,
}

impl Transcoders {
    /// Builds a set from explicit implementations.
    pub fn new(image: Box<dyn Transcoder>, video: Box<dyn Transcoder>) -> Self {
        Self { image, video }
    }

    /// The default backends: the `image` crate for stills and `ffmpeg` for video.
    pub fn system() -> Self {
        Self::new(
            Box::new(ImageTranscoder),
            Box::new(FfmpegTranscoder::default()),
        )
    }

    /// Dispatches to the transcoder for `kind`.
    pub fn compress(
        &self,
        source: &Path,
        kind: MediaKind,
        config: &CompressionConfig,
    ) -> Result<CompressedOutput, CompressionError> {
        match kind {
            MediaKind::Image => self.image.compress(source, config),
            MediaKind::Video => self.video.compress(source, config),
        }
    }
}

impl Default for Transcoders {
    fn default() -> Self {
        Self::system()
    }
}
