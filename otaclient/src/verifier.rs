//! SHA-256 integrity verification of staged artifacts.
//!
//! The artifact is streamed through the hasher in fixed-size chunks so
//! verification never needs the whole image in memory.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::descriptor::normalize_digest;
use crate::error::{UpdateError, UpdateResult};

/// Default buffer size for hashing (4KB).
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Result of comparing an artifact against its expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Convert a mismatch into `UpdateError::VerificationMismatch`.
    pub fn into_result(self) -> UpdateResult<()> {
        match self {
            Self::Match => Ok(()),
            Self::Mismatch { expected, actual } => {
                Err(UpdateError::VerificationMismatch { expected, actual })
            }
        }
    }
}

/// Streaming SHA-256 verifier.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    buffer_size: usize,
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Use a custom read buffer size (minimum 1 byte).
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Compute the lowercase hex SHA-256 of everything `reader` yields.
    pub fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Compare the digest of `reader` with `expected`.
    ///
    /// Comparison is case-insensitive. An `expected` value that is not a
    /// 64-character hex string is reported as a mismatch.
    pub fn verify(&self, reader: &mut dyn Read, expected: &str) -> io::Result<Verification> {
        let actual = self.digest_reader(reader)?;
        match normalize_digest(expected) {
            Some(expected) if expected == actual => Ok(Verification::Match),
            _ => Ok(Verification::Mismatch {
                expected: expected.to_string(),
                actual,
            }),
        }
    }

    /// Compute the SHA-256 of the file at `path`.
    pub fn digest_file(&self, path: &Path) -> UpdateResult<String> {
        let mut file = File::open(path).map_err(|e| UpdateError::storage(path, e))?;
        self.digest_reader(&mut file)
            .map_err(|e| UpdateError::storage(path, e))
    }

    /// Verify the file at `path` against `expected`.
    pub fn verify_file(&self, path: &Path, expected: &str) -> UpdateResult<Verification> {
        let mut file = File::open(path).map_err(|e| UpdateError::storage(path, e))?;
        self.verify(&mut file, expected)
            .map_err(|e| UpdateError::storage(path, e))
    }
}
