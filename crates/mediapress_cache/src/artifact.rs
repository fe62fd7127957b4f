//! Content-addressed storage of compressed artifacts.
//!
//! Every artifact lives directly in the cache directory as
//! `<digest>.<ext>`, where the digest is that of the *original* source bytes
//! and the extension is the source's own (lowercased). Naming by digest
//! guarantees that identical sources share one artifact.

use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

use mediapress_common::{ContentDigest, MediaKind};

use crate::error::CacheError;
use crate::manifest::{write_atomic, CacheEntry, MANIFEST_FILE};

/// Flat artifact store rooted at the cache directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Root cache directory.
    cache_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a new artifact store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// The root cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Creates the cache directory if needed and checks that it is a directory.
    ///
    /// Failure here is fatal to a run: nothing can be cached.
    pub fn ensure_dir(&self) -> Result<(), CacheError> {
        let unavailable = |source| CacheError::CacheDirUnavailable {
            path: self.cache_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.cache_dir).map_err(unavailable)?;
        let meta = std::fs::metadata(&self.cache_dir).map_err(unavailable)?;
        if !meta.is_dir() {
            return Err(unavailable(std::io::Error::new(
                std::io::ErrorKind::Other,
                "not a directory",
            )));
        }
        Ok(())
    }

    /// Returns the file name for an artifact: `<digest>.<ext>`.
    pub fn artifact_name(digest: &ContentDigest, ext: &str) -> PathBuf {
        if ext.is_empty() {
            PathBuf::from(digest.to_string())
        } else {
            PathBuf::from(format!("{digest}.{}", ext.to_ascii_lowercase()))
        }
    }

    /// Parses a file name of the form `<digest>.<ext>`.
    ///
    /// Only names this store could have written are accepted: a 64-character
    /// lowercase hex digest followed by a lowercase image or video extension.
    pub fn parse_artifact_name(name: &OsStr) -> Option<(ContentDigest, MediaKind)> {
        let name = name.to_str()?;
        let (stem, ext) = name.split_once('.')?;
        if stem.len() != 64 || ext != ext.to_ascii_lowercase() {
            return None;
        }
        let digest = stem.parse::<ContentDigest>().ok()?;
        if digest.to_string() != stem {
            return None;
        }
        Some((digest, MediaKind::from_extension(ext)?))
    }

    /// Resolves an entry's artifact path against the cache directory.
    pub fn path_of(&self, entry: &CacheEntry) -> PathBuf {
        self.cache_dir.join(&entry.artifact_path)
    }

    /// Writes an artifact atomically and returns its name relative to the
    /// cache directory.
    pub fn write_artifact(
        &self,
        digest: &ContentDigest,
        ext: &str,
        data: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let name = Self::artifact_name(digest, ext);
        write_atomic(&self.cache_dir.join(&name), data)?;
        Ok(name)
    }

    /// Copies an artifact that was produced on disk into the store.
    ///
    /// The file is streamed, never read into memory whole. Returns the
    /// artifact name and its size.
    pub fn import_artifact(
        &self,
        digest: &ContentDigest,
        ext: &str,
        src: &Path,
    ) -> Result<(PathBuf, u64), CacheError> {
        let name = Self::artifact_name(digest, ext);
        let size = copy_atomic(src, &self.cache_dir.join(&name))?;
        Ok((name, size))
    }

    /// Returns `true` if the entry's artifact exists with its recorded size.
    pub fn is_intact(&self, entry: &CacheEntry) -> bool {
        std::fs::metadata(self.path_of(entry))
            .map(|m| m.is_file() && m.len() == entry.compressed_size)
            .unwrap_or(false)
    }

    /// Copies an entry's artifact to `dest`, atomically replacing it.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_out(&self, entry: &CacheEntry, dest: &Path) -> Result<u64, CacheError> {
        copy_atomic(&self.path_of(entry), dest)
    }

    /// Deletes an entry's artifact. A file that is already gone is not an error.
    pub fn remove(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.path_of(entry);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes artifact files not named in `live_names`.
    ///
    /// Only regular files whose name parses as an artifact name are
    /// candidates; the manifest, temporary files and anything else a user
    /// keeps in the directory are left alone. Returns the number of files
    /// removed.
    pub fn gc(&self, live_names: &[&Path]) -> Result<usize, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries =
            std::fs::read_dir(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.cache_dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            if Self::parse_artifact_name(name).is_none() {
                continue;
            }
            if !live_names.iter().any(|live| live.as_os_str() == name) {
                std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Deletes the manifest and every artifact, leaving the directory in place.
    ///
    /// Files that are not artifacts survive, as with [`ArtifactStore::gc`].
    pub fn clear(&self) -> Result<(), CacheError> {
        self.ensure_dir()?;
        self.gc(&[])?;
        let manifest = self.cache_dir.join(MANIFEST_FILE);
        match std::fs::remove_file(&manifest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(manifest, e)),
        }
    }
}

/// Copies `src` over `dest` through a temporary sibling file and a rename.
///
/// Readers of `dest` see either the old or the new contents, never a partial
/// file. Returns the number of bytes copied.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<u64, CacheError> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
    let mut input = File::open(src).map_err(|e| CacheError::io(src, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    let copied = std::io::copy(&mut input, &mut tmp).map_err(|e| CacheError::io(dest, e))?;
    tmp.persist(dest).map_err(|e| CacheError::io(dest, e.error))?;
    Ok(copied)
}
