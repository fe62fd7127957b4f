//! Streaming content hashing of source files.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use mediapress_common::ContentDigest;
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Size of the read buffer used while hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Utility for computing content digests of site files.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the SHA-256 digest of a file's bytes.
    ///
    /// The file is streamed in fixed-size chunks, so large videos are never
    /// held in memory at once.
    pub fn hash_file(path: &Path) -> Result<ContentDigest, CacheError> {
        let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        Self::hash_reader(file).map_err(|e| CacheError::io(path, e))
    }

    /// Computes the SHA-256 digest of everything readable from `reader`.
    pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<ContentDigest> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(ContentDigest::from_raw(hasher.finalize().into()))
    }
}
