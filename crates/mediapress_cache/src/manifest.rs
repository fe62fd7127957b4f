//! Cache manifest mapping content digests to cached artifacts.
//!
//! The manifest is stored as `.cache.json` in the cache directory, next to
//! the artifacts it describes:
//!
//! ```json
//! {
//!   "config": { "image_quality": 85, "...": "..." },
//!   "entries": {
//!     "<digest>": { "path": "<digest>.jpg", "original_size": 1000,
//!                   "compressed_size": 600, "kind": "image" }
//!   }
//! }
//! ```
//!
//! The whole manifest is tied to the [`ConfigSnapshot`] it was built under.
//! A manifest recorded under different settings is discarded on load.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use mediapress_common::{ContentDigest, MediaKind};
use mediapress_config::{ConfigChange, ConfigSnapshot};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
pub const MANIFEST_FILE: &str = ".cache.json";

/// Metadata for one cached compressed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Digest of the original source bytes.
    pub digest: ContentDigest,
    /// Artifact file name, relative to the cache directory.
    pub artifact_path: PathBuf,
    /// Size of the original source in bytes.
    pub original_size: u64,
    /// Size of the compressed artifact in bytes.
    pub compressed_size: u64,
    /// Media family the artifact belongs to.
    pub kind: MediaKind,
}

/// On-disk form of a [`CacheEntry`]; the digest is the map key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    path: PathBuf,
    original_size: u64,
    compressed_size: u64,
    kind: MediaKind,
}

/// Manifest as read from disk. The snapshot is kept as raw JSON so that
/// added or removed fields compare unequal instead of being defaulted.
#[derive(Debug, Deserialize)]
struct StoredManifest {
    config: serde_json::Value,
    entries: BTreeMap<ContentDigest, StoredEntry>,
}

#[derive(Serialize)]
struct StoredManifestRef<'a> {
    config: &'a ConfigSnapshot,
    entries: BTreeMap<&'a ContentDigest, StoredEntry>,
}

/// What [`CacheManifest::load`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No manifest file existed.
    Missing,
    /// A manifest existed but could not be read or parsed.
    Unreadable {
        /// Description of the failure.
        reason: String,
    },
    /// A manifest existed but was built under different settings.
    Invalidated {
        /// Every field that changed.
        changes: Vec<ConfigChange>,
    },
    /// The manifest was loaded and is valid for the current settings.
    Reused {
        /// Number of entries loaded.
        entries: usize,
    },
}

/// In-memory cache manifest.
///
/// Owned by [`CacheStore`](crate::CacheStore), which serializes all mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManifest {
    config: ConfigSnapshot,
    entries: BTreeMap<ContentDigest, CacheEntry>,
}

impl CacheManifest {
    /// Creates an empty manifest for the given settings.
    pub fn new(config: ConfigSnapshot) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
        }
    }

    /// Loads the manifest from `cache_dir`.
    ///
    /// Never fails: a missing, unreadable, or stale manifest yields an empty
    /// one for `current`, and the returned [`LoadOutcome`] says why.
    ///
    /// Entries whose `path` is not the artifact name for their own digest and
    /// kind are dropped, so a hand-edited manifest can never point eviction or
    /// copy-out at a file outside the cache.
    pub fn load(cache_dir: &Path, current: &ConfigSnapshot) -> (Self, LoadOutcome) {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (Self::new(current.clone()), LoadOutcome::Missing);
            }
            Err(e) => {
                let reason = CacheError::io(path, e).to_string();
                return (Self::new(current.clone()), LoadOutcome::Unreadable { reason });
            }
        };

        let stored: StoredManifest = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                let reason = CacheError::ManifestParse {
                    reason: e.to_string(),
                }
                .to_string();
                return (Self::new(current.clone()), LoadOutcome::Unreadable { reason });
            }
        };

        if !current.matches_json(&stored.config) {
            let changes = current.diff_json(&stored.config);
            return (Self::new(current.clone()), LoadOutcome::Invalidated { changes });
        }

        let entries: BTreeMap<ContentDigest, CacheEntry> = stored
            .entries
            .into_iter()
            .filter_map(|(digest, e)| {
                let named = ArtifactStore::parse_artifact_name(e.path.as_os_str());
                if named != Some((digest, e.kind)) {
                    tracing::warn!(
                        path = %e.path.display(),
                        "dropping cache entry with a malformed artifact path"
                    );
                    return None;
                }
                let entry = CacheEntry {
                    digest,
                    artifact_path: e.path,
                    original_size: e.original_size,
                    compressed_size: e.compressed_size,
                    kind: e.kind,
                };
                Some((digest, entry))
            })
            .collect();
        let count = entries.len();
        (
            Self {
                config: current.clone(),
                entries,
            },
            LoadOutcome::Reused { entries: count },
        )
    }

    /// Writes the manifest to `cache_dir` atomically.
    ///
    /// The JSON is written to a temporary file in the same directory and then
    /// renamed over `.cache.json`, so an interrupted write leaves the previous
    /// manifest intact.
    pub fn persist(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let stored = StoredManifestRef {
            config: &self.config,
            entries: self
                .entries
                .iter()
                .map(|(digest, e)| {
                    (
                        digest,
                        StoredEntry {
                            path: e.artifact_path.clone(),
                            original_size: e.original_size,
                            compressed_size: e.compressed_size,
                            kind: e.kind,
                        },
                    )
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        write_atomic(&cache_dir.join(MANIFEST_FILE), &json)
    }

    /// The settings this manifest was built under.
    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    /// Looks up the entry for a digest.
    pub fn lookup(&self, digest: &ContentDigest) -> Option<&CacheEntry> {
        self.entries.get(digest)
    }

    /// Adds or replaces the entry for `entry.digest`, returning the old one.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.digest, entry)
    }

    /// Removes and returns the entry for a digest.
    pub fn remove(&mut self, digest: &ContentDigest) -> Option<CacheEntry> {
        self.entries.remove(digest)
    }

    /// Iterates over all entries in digest order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes `data` to `path` through a temporary sibling file and a rename.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediapress_config::CompressionConfig;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::capture(&CompressionConfig::default())
    }

    fn entry(content: &[u8], kind: MediaKind) -> CacheEntry {
        let digest = ContentDigest::from_bytes(content);
        let ext = match kind {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        };
        CacheEntry {
            digest,
            artifact_path: PathBuf::from(format!("{digest}.{ext}")),
            original_size: 1_000,
            compressed_size: 600,
            kind,
        }
    }

    #[test]
    fn new_manifest_is_empty() {
        let m = CacheManifest::new(snapshot());
        assert!(m.is_empty());
        assert_eq!(m.config(), &snapshot());
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new(snapshot());
        m.insert(entry(b"a", MediaKind::Image));
        m.insert(entry(b"b", MediaKind::Video));
        m.persist(dir.path()).unwrap();

        let (loaded, outcome) = CacheManifest::load(dir.path(), &snapshot());
        assert_eq!(outcome, LoadOutcome::Reused { entries: 2 });
        assert_eq!(loaded, m);
    }

    #[test]
    fn repersisting_unchanged_manifest_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new(snapshot());
        m.insert(entry(b"a", MediaKind::Image));
        m.persist(dir.path()).unwrap();
        let first = std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap();

        let (loaded, _) = CacheManifest::load(dir.path(), &snapshot());
        loaded.persist(dir.path()).unwrap();
        let second = std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap();

        assert_eq!(first, second);
        let (reloaded, _) = CacheManifest::load(dir.path(), &snapshot());
        assert_eq!(reloaded, loaded);
    }

    #[test]
    fn on_disk_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new(snapshot());
        let e = entry(b"a", MediaKind::Image);
        m.insert(e.clone());
        m.persist(dir.path()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["config"]["image_quality"], 85);
        let stored = &raw["entries"][e.digest.to_string()];
        assert_eq!(stored["path"], format!("{}.jpg", e.digest));
        assert_eq!(stored["original_size"], 1_000);
        assert_eq!(stored["compressed_size"], 600);
        assert_eq!(stored["kind"], "image");
    }

    #[test]
    fn load_nonexistent_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (m, outcome) = CacheManifest::load(dir.path(), &snapshot());
        assert!(m.is_empty());
        assert_eq!(outcome, LoadOutcome::Missing);
    }

    #[test]
    fn load_corrupt_json_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not valid json {{{").unwrap();
        let (m, outcome) = CacheManifest::load(dir.path(), &snapshot());
        assert!(m.is_empty());
        assert!(matches!(outcome, LoadOutcome::Unreadable { .. }));
    }

    #[test]
    fn load_format_without_config_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"abc": {"cached_filename": "abc.png", "original_hash": "abc"}}"#,
        )
        .unwrap();
        let (m, outcome) = CacheManifest::load(dir.path(), &snapshot());
        assert!(m.is_empty());
        assert!(matches!(outcome, LoadOutcome::Unreadable { .. }));
    }

    #[test]
    fn entries_with_foreign_paths_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new(snapshot());
        let good = entry(b"good", MediaKind::Image);
        m.insert(good.clone());
        m.persist(dir.path()).unwrap();

        let manifest_path = dir.path().join(MANIFEST_FILE);
        let mut raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        let other = ContentDigest::from_bytes(b"other");
        let bad_paths = [
            "../victim.txt".to_string(),
            "/etc/hosts".to_string(),
            format!("sub/{other}.jpg"),
            format!("{}.jpg", ContentDigest::from_bytes(b"someone else")),
            format!("{other}.mp4"),
        ];
        for (i, path) in bad_paths.iter().enumerate() {
            let key = ContentDigest::from_bytes(&[i as u8]);
            let path = path.replace(&other.to_string(), &key.to_string());
            raw["entries"][key.to_string()] = serde_json::json!({
                "path": path,
                "original_size": 10,
                "compressed_size": 5,
                "kind": "image",
            });
        }
        std::fs::write(&manifest_path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let (loaded, outcome) = CacheManifest::load(dir.path(), &snapshot());
        assert_eq!(outcome, LoadOutcome::Reused { entries: 1 });
        assert_eq!(loaded.entries().collect::<Vec<_>>(), vec![&good]);
    }

    #[test]
    fn changed_config_discards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = CacheManifest::new(snapshot());
        m.insert(entry(b"a", MediaKind::Image));
        m.persist(dir.path()).unwrap();

        let changed = ConfigSnapshot::capture(&CompressionConfig {
            image_quality: 70,
            ..CompressionConfig::default()
        });
        let (loaded, outcome) = CacheManifest::load(dir.path(), &changed);
        assert!(loaded.is_empty());
        assert_eq!(loaded.config(), &changed);
        match outcome {
            LoadOutcome::Invalidated { changes } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].field, "image_quality");
            }
            other => panic!("expected Invalidated, got {other:?}"),
        }
    }

    #[test]
    fn insert_overwrites_by_digest() {
        let mut m = CacheManifest::new(snapshot());
        let first = entry(b"a", MediaKind::Image);
        let mut second = first.clone();
        second.compressed_size = 10;
        assert!(m.insert(first.clone()).is_none());
        assert_eq!(m.insert(second.clone()), Some(first));
        assert_eq!(m.len(), 1);
        assert_eq!(m.lookup(&second.digest), Some(&second));
    }

    #[test]
    fn remove_entry() {
        let mut m = CacheManifest::new(snapshot());
        let e = entry(b"a", MediaKind::Image);
        m.insert(e.clone());
        assert_eq!(m.remove(&e.digest), Some(e.clone()));
        assert!(m.lookup(&e.digest).is_none());
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new contents").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new contents");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
