//! Content hashes and storage-scheme versioning.

use core::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};

use crate::error::{ChunkError, ChunkResult};

/// Number of raw bytes in a chunk hash (SHA-512).
pub const HASH_LEN: usize = 64;

/// SHA-512 digest identifying one chunk's exact bytes.
///
/// Rendered as 128 lowercase hex characters everywhere it crosses a
/// serialization or filesystem boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHash([u8; HASH_LEN]);

impl ChunkHash {
    /// Computes the hash of the given bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut raw = [0u8; HASH_LEN];
        raw.copy_from_slice(&out);
        Self(raw)
    }

    /// Wraps raw digest bytes without hashing.
    pub fn from_raw(raw: [u8; HASH_LEN]) -> Self {
        Self(raw)
    }

    /// Parses a 128-character lowercase hex string.
    pub fn from_hex(s: &str) -> ChunkResult<Self> {
        let bytes = hex::decode(s).map_err(|_| ChunkError::InvalidHash(s.to_string()))?;
        let raw: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| ChunkError::InvalidHash(s.to_string()))?;
        Ok(Self(raw))
    }

    /// Returns the 128-character lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({}…)", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ChunkHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChunkHash::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Storage-scheme version byte for the blob layout.
///
/// A new scheme can change the on-disk layout while chunks written under an
/// older scheme remain reachable; there is no implicit migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StoreScheme {
    /// Fan-out layout: `data_dir/<hex[0..8]>/<hex[8..]>`.
    V1 = 1,
}

impl StoreScheme {
    /// The scheme new chunks are written under.
    pub const CURRENT: StoreScheme = StoreScheme::V1;

    /// Returns the raw scheme byte.
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Resolves a raw scheme byte, or errors on an unknown one.
    pub fn from_byte(b: u8) -> ChunkResult<Self> {
        match b {
            1 => Ok(StoreScheme::V1),
            other => Err(ChunkError::UnsupportedScheme(other)),
        }
    }
}

impl fmt::Display for StoreScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_length() {
        let hash = ChunkHash::digest(b"dummy content");
        assert_eq!(hash.as_bytes().len(), HASH_LEN);
        assert_eq!(hash.to_hex().len(), HASH_LEN * 2);
    }

    #[test]
    fn test_digest_deterministic() {
        let a = ChunkHash::digest(b"same bytes");
        let b = ChunkHash::digest(b"same bytes");
        assert_eq!(a, b);

        let c = ChunkHash::digest(b"different bytes");
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = ChunkHash::digest(b"roundtrip");
        let parsed = ChunkHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ChunkHash::from_hex("zz").is_err());
        assert!(ChunkHash::from_hex("abcd").is_err());
        assert!(ChunkHash::from_hex(&"a".repeat(127)).is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = ChunkHash::digest(b"serde");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));

        let back: ChunkHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn test_scheme_byte_roundtrip() {
        assert_eq!(StoreScheme::from_byte(1).unwrap(), StoreScheme::V1);
        assert_eq!(StoreScheme::V1.as_byte(), 1);
        assert!(StoreScheme::from_byte(0).is_err());
        assert!(StoreScheme::from_byte(2).is_err());
    }

    #[test]
    fn test_scheme_display() {
        assert_eq!(format!("{}", StoreScheme::V1), "v1");
    }

    #[test]
    fn test_debug_is_truncated() {
        let hash = ChunkHash::digest(b"debug");
        let dbg = format!("{:?}", hash);
        assert!(dbg.len() < 40);
        assert!(dbg.starts_with("ChunkHash("));
    }
}
