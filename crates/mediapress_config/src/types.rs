//! Configuration types deserialized from `mediapress.toml`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default build output directory, relative to the config file.
pub const DEFAULT_SITE_DIR: &str = "site";

/// Default cache directory, relative to the config file.
pub const DEFAULT_CACHE_DIR: &str = ".mediapress_cache";

/// The top-level configuration parsed from `mediapress.toml`.
///
/// Path fields are resolved against the directory containing the config file
/// by [`load_config`](crate::load_config).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaPressConfig {
    /// The built site tree whose media files are compressed.
    #[serde(default = "default_site_dir")]
    pub site_dir: PathBuf,
    /// Directory holding the cache manifest and cached artifacts.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Optional mirror destination. When absent, files in `site_dir` are
    /// replaced in place.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Every setting that affects compressed output.
    #[serde(default)]
    pub compression: CompressionConfig,
}

fn default_site_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SITE_DIR)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

impl Default for MediaPressConfig {
    fn default() -> Self {
        Self {
            site_dir: default_site_dir(),
            cache_dir: default_cache_dir(),
            output_dir: None,
            compression: CompressionConfig::default(),
        }
    }
}

/// Compression tunables.
///
/// All fields take part in the [`ConfigSnapshot`](crate::ConfigSnapshot)
/// stored in the cache manifest, so changing any of them invalidates the
/// whole cache on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// JPEG/WebP quality, 1–100.
    pub image_quality: u8,
    /// Images wider than this are downscaled, preserving aspect ratio.
    pub image_max_width: Option<u32>,
    /// Images taller than this are downscaled, preserving aspect ratio.
    pub image_max_height: Option<u32>,
    /// x264 constant rate factor, 0–51.
    pub video_crf: u8,
    /// x264 encoder preset.
    pub video_preset: VideoPreset,
    /// Videos wider than this are downscaled, preserving aspect ratio.
    pub video_max_width: Option<u32>,
    /// Pass images through untouched.
    pub skip_images: bool,
    /// Pass videos through untouched.
    pub skip_videos: bool,
    /// Size of the compression worker pool.
    pub max_workers: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            image_quality: 85,
            image_max_width: None,
            image_max_height: None,
            video_crf: 23,
            video_preset: VideoPreset::default(),
            video_max_width: None,
            skip_images: false,
            skip_videos: false,
            max_workers: 4,
        }
    }
}

/// x264 speed/size presets accepted by `ffmpeg -preset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPreset {
    /// `ultrafast`
    Ultrafast,
    /// `superfast`
    Superfast,
    /// `veryfast`
    Veryfast,
    /// `faster`
    Faster,
    /// `fast`
    Fast,
    /// `medium`, the x264 default.
    #[default]
    Medium,
    /// `slow`
    Slow,
    /// `slower`
    Slower,
    /// `veryslow`
    Veryslow,
    /// `placebo`
    Placebo,
}

impl VideoPreset {
    /// The preset name as passed to `ffmpeg`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

impl fmt::Display for VideoPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
