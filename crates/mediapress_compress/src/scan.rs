//! Site-tree enumeration and classification.

use std::path::{Path, PathBuf};

use mediapress_common::MediaKind;
use mediapress_config::CompressionConfig;

/// A media file selected for hashing and compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path in the site tree.
    pub path: PathBuf,
    /// Media family, from the extension.
    pub kind: MediaKind,
}

/// Every file in the site tree, sorted into what the run will do with it.
#[derive(Debug, Default)]
pub struct SiteScan {
    /// Media files to hash and compress.
    pub candidates: Vec<Candidate>,
    /// Media files whose family is disabled by a skip flag.
    pub skipped: Vec<PathBuf>,
    /// Files that are not recognized media.
    pub other: Vec<PathBuf>,
}

impl SiteScan {
    /// Total number of files seen.
    pub fn total(&self) -> usize {
        self.candidates.len() + self.skipped.len() + self.other.len()
    }
}

/// Recursively collects and classifies every file under `root`.
///
/// Directories listed in `exclude` (such as a cache or output directory
/// nested inside the site) are not descended into. Symbolic links are not
/// followed. Unreadable subdirectories are logged and skipped; only failure to
/// read `root` itself is an error. Results are sorted by path.
pub fn scan_site(
    root: &Path,
    exclude: &[PathBuf],
    config: &CompressionConfig,
) -> std::io::Result<SiteScan> {
    let mut scan = SiteScan::default();
    let entries = std::fs::read_dir(root)?;
    walk_entries(entries, exclude, config, &mut scan);
    scan.candidates.sort_by(|a, b| a.path.cmp(&b.path));
    scan.skipped.sort();
    scan.other.sort();
    Ok(scan)
}

fn walk_dir(dir: &Path, exclude: &[PathBuf], config: &CompressionConfig, scan: &mut SiteScan) {
    match std::fs::read_dir(dir) {
        Ok(entries) => walk_entries(entries, exclude, config, scan),
        Err(e) => tracing::warn!(dir = %dir.display(), "skipping unreadable directory: {e}"),
    }
}

fn walk_entries(
    entries: std::fs::ReadDir,
    exclude: &[PathBuf],
    config: &CompressionConfig,
    scan: &mut SiteScan,
) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if !exclude.iter().any(|ex| ex == &path) {
                walk_dir(&path, exclude, config, scan);
            }
        } else if file_type.is_file() {
            classify(path, config, scan);
        }
    }
}

fn classify(path: PathBuf, config: &CompressionConfig, scan: &mut SiteScan) {
    match MediaKind::from_path(&path) {
        Some(MediaKind::Image) if config.skip_images => scan.skipped.push(path),
        Some(MediaKind::Video) if config.skip_videos => scan.skipped.push(path),
        Some(kind) => scan.candidates.push(Candidate { path, kind }),
        None => scan.other.push(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn classifies_recursively_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.png"));
        touch(&root.join("assets/img/a.JPG"));
        touch(&root.join("media/clip.mp4"));
        touch(&root.join("index.html"));

        let scan = scan_site(root, &[], &CompressionConfig::default()).unwrap();
        let paths: Vec<_> = scan.candidates.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                root.join("assets/img/a.JPG"),
                root.join("b.png"),
                root.join("media/clip.mp4"),
            ]
        );
        assert_eq!(scan.candidates[2].kind, MediaKind::Video);
        assert_eq!(scan.other, vec![root.join("index.html")]);
        assert_eq!(scan.total(), 4);
    }

    #[test]
    fn skip_flags_move_files_to_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.png"));
        touch(&root.join("v.webm"));

        let config = CompressionConfig {
            skip_videos: true,
            ..CompressionConfig::default()
        };
        let scan = scan_site(root, &[], &config).unwrap();
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.skipped, vec![root.join("v.webm")]);
    }

    #[test]
    fn excluded_directories_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.png"));
        touch(&root.join(".cache/deadbeef.png"));

        let scan = scan_site(root, &[root.join(".cache")], &CompressionConfig::default()).unwrap();
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.total(), 1);
    }

    #[test]
    fn missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_site(&dir.path().join("nope"), &[], &CompressionConfig::default()).is_err());
    }

    #[test]
    fn empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan_site(dir.path(), &[], &CompressionConfig::default()).unwrap();
        assert_eq!(scan.total(), 0);
    }
}
