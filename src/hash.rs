// src/hash.rs

//! Multi-algorithm file digests
//!
//! APT indexes carry MD5, SHA-1 and SHA-256 digests side by side. All three
//! are computed from a single read of the input.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithms emitted in Packages and Release files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// All algorithms, in the order they are written
    pub const ALL: [HashAlgorithm; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    /// Field name used in index files
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }
}

/// Hex digests of one input under every supported algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiHash {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl MultiHash {
    pub fn get(&self, algorithm: HashAlgorithm) -> &str {
        match algorithm {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
        }
    }

    /// `(field name, hex digest)` pairs in index order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        HashAlgorithm::ALL
            .iter()
            .map(|alg| (alg.field_name(), self.get(*alg).to_string()))
            .collect()
    }
}

/// Digest everything readable from `reader`
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<MultiHash> {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();

    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let chunk = &buffer[..read];
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
    }

    Ok(MultiHash {
        md5: format!("{:x}", md5.finalize()),
        sha1: format!("{:x}", sha1.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}

/// Digest a file on disk
pub fn hash_file(path: &Path) -> io::Result<MultiHash> {
    hash_reader(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_input_digests() {
        let temp_file = NamedTempFile::new().unwrap();
        let hashes = hash_file(temp_file.path()).unwrap();

        assert_eq!(hashes.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hashes.sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            hashes.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_known_digests() {
        let hashes = hash_reader(&b"abc"[..]).unwrap();
        assert_eq!(hashes.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hashes.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hashes.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_multi_chunk_input_matches_single_digest() {
        let data = vec![0x5au8; READ_BUFFER_SIZE * 2 + 17];
        let hashes = hash_reader(&data[..]).unwrap();
        assert_eq!(hashes.sha256, format!("{:x}", Sha256::digest(&data)));
    }

    #[test]
    fn test_field_order() {
        let hashes = hash_reader(&b""[..]).unwrap();
        let names: Vec<&str> = hashes.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["MD5sum", "SHA1", "SHA256"]);
    }
}
