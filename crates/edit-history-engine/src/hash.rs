//! Content hashing.
//!
//! SHA-256 over exact bytes, emitted as lowercase hex. Large files are
//! streamed through the hasher in fixed-size chunks rather than materialized
//! twice.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

const STREAM_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Streams `reader` through the hasher in fixed-size chunks, avoiding a
    /// second full-file allocation for large files.
    pub fn of_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; STREAM_CHUNK_BYTES];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::of_reader(file)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_hashes_to_known_sha256() {
        let h = ContentHash::of_bytes(b"");
        assert_eq!(
            h.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let a = ContentHash::of_bytes(b"hello\n");
        let b = ContentHash::of_bytes(b"hello\n");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        let a = ContentHash::of_bytes(b"hello\n");
        let b = ContentHash::of_bytes(b"world\n");
        assert_ne!(a, b);
    }

    #[test]
    fn reader_and_bytes_agree() {
        let data = b"the quick brown fox".repeat(1000);
        let from_bytes = ContentHash::of_bytes(&data);
        let from_reader = ContentHash::of_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(from_bytes, from_reader);
    }
}
