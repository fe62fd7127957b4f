//! Media families and the extension tables that classify files into them.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Extensions (lowercase, without the dot) recognized as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Extensions (lowercase, without the dot) recognized as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "avi", "mkv"];

/// The media family of a candidate file.
///
/// Each family is handled by its own transcoder; files outside both families
/// are never hashed or cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still images (`png`, `jpg`, `jpeg`, `gif`, `webp`, `bmp`).
    Image,
    /// Video containers (`mp4`, `webm`, `ogg`, `mov`, `avi`, `mkv`).
    Video,
}

impl MediaKind {
    /// Classifies a path by its extension, case-insensitively.
    ///
    /// Returns `None` for unsupported or missing extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Classifies a lowercase extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}
