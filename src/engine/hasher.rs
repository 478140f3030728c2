//! Content hashing for duplicate detection.
//!
//! Files are read in fixed 128 KiB chunks on the blocking thread pool, so a
//! large image never stalls the async workers and memory use stays flat.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use blake3::Hasher as Blake3Hasher;
use clap::ValueEnum;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, instrument};

/// Chunk size used when streaming a file through the digest.
pub const HASH_CHUNK_SIZE: usize = 128 * 1024;

/// Error types for content hashing
#[derive(Error, Debug)]
pub enum HashError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for hashing operations
pub type HashResult<T> = Result<T, HashError>;

/// Digest used to compare a local file with the hash reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Gelbooru reports MD5 for every post.
    #[default]
    Md5,
    Sha256,
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

enum Digester {
    Md5(Md5),
    Sha256(Sha256),
    Blake3(Box<Blake3Hasher>),
}

impl Digester {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Digester::Md5(Md5::new()),
            HashAlgorithm::Sha256 => Digester::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Digester::Blake3(Box::new(Blake3Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Digester::Md5(h) => h.update(chunk),
            Digester::Sha256(h) => h.update(chunk),
            Digester::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Digester::Md5(h) => hex::encode(h.finalize()),
            Digester::Sha256(h) => hex::encode(h.finalize()),
            Digester::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hashes a reader chunk by chunk. Blocking.
fn digest_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut digester = Digester::new(algorithm);
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digester.update(&buffer[..bytes_read]);
    }

    Ok(digester.finalize_hex())
}

/// Computes the lowercase hex digest of the file at `path`.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), algorithm = %algorithm))]
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> HashResult<String> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || -> HashResult<String> {
        let file = File::open(&owned).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HashError::NotFound(owned.clone()),
            _ => HashError::Io(e),
        })?;
        Ok(digest_reader(file, algorithm)?)
    })
    .await??;

    debug!("Hashed {} -> {}", path.display(), digest);
    Ok(digest)
}

/// Hex digests are compared case-insensitively.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}
