//! Content digests used as cache keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a [`ContentDigest`] in bytes.
pub const DIGEST_LEN: usize = 32;

/// A 256-bit SHA-256 digest of a file's raw bytes.
///
/// Two files with the same `ContentDigest` are assumed to have identical
/// content. The digest is independent of the file's path or name, so it is
/// used as the key of the compression cache and as the stem of every cached
/// artifact file.
///
/// Serialized as a 64-character lowercase hex string so it can be used as a
/// JSON object key in the cache manifest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Computes a digest from an in-memory byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wraps an already finalized SHA-256 output.
    pub fn from_raw(raw: [u8; DIGEST_LEN]) -> Self {
        Self(raw)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

/// Error returned when parsing a [`ContentDigest`] from a hex string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDigestError(String);

impl fmt::Display for ParseDigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content digest: {}", self.0)
    }
}

impl std::error::Error for ParseDigestError {}

impl FromStr for ContentDigest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut raw).map_err(|e| ParseDigestError(e.to_string()))?;
        Ok(Self(raw))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentDigest({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentDigest::from_bytes(b"hello world");
        let b = ContentDigest::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentDigest::from_bytes(b"hello");
        let b = ContentDigest::from_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn known_sha256_of_empty_input() {
        let d = ContentDigest::from_bytes(b"");
        assert_eq!(
            d.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn display_is_64_hex_chars() {
        let s = ContentDigest::from_bytes(b"test").to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_display_output() {
        let d = ContentDigest::from_bytes(b"parse me");
        let back: ContentDigest = d.to_string().parse().unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn parse_rejects_short_and_non_hex() {
        assert!("abcd".parse::<ContentDigest>().is_err());
        assert!("zz".repeat(32).parse::<ContentDigest>().is_err());
    }

    #[test]
    fn debug_abbreviated() {
        let s = format!("{:?}", ContentDigest::from_bytes(b"test"));
        assert!(s.starts_with("ContentDigest("));
        assert!(s.ends_with("..)"));
    }

    #[test]
    fn usable_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ContentDigest::from_bytes(b"key"), 7u32);
        let json = serde_json::to_string(&map).unwrap();
        let back: std::collections::BTreeMap<ContentDigest, u32> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
