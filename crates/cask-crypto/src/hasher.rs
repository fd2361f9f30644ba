use std::fmt;
use std::io;
use std::str::FromStr;

use cask_types::Key;
use serde::{Deserialize, Serialize};
use sha1::Digest;

/// Digest algorithm a store derives its keys with.
///
/// The algorithm is bound to a store for its whole lifetime: it fixes the
/// size of every key the store produces and the accumulator used to verify
/// reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1 (20-byte digests).
    #[default]
    Sha1,
    /// SHA-256 (32-byte digests).
    Sha256,
    /// BLAKE3 (32-byte digests).
    Blake3,
}

impl HashAlgorithm {
    /// Size in bytes of the digests this algorithm produces.
    pub const fn digest_size(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Blake3 => 32,
        }
    }

    /// Lowercase algorithm name, as used in configuration.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// A fresh accumulator for this algorithm.
    pub fn hasher(&self) -> ContentHasher {
        let state = match self {
            Self::Sha1 => HasherState::Sha1(sha1::Sha1::new()),
            Self::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
            Self::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        ContentHasher {
            algorithm: *self,
            state,
        }
    }

    /// Digest a complete byte slice in one call.
    pub fn hash(&self, data: &[u8]) -> Key {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(HasherError::UnknownAlgorithm(s.to_string())),
        }
    }
}

enum HasherState {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Running digest over a byte stream.
///
/// Single-use: feed bytes with [`update`](Self::update) (or through the
/// [`io::Write`] impl), then consume it with [`finalize`](Self::finalize).
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl ContentHasher {
    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish the digest and return it as a key.
    pub fn finalize(self) -> Key {
        match self.state {
            HasherState::Sha1(h) => Key::new(h.finalize().to_vec()),
            HasherState::Sha256(h) => Key::new(h.finalize().to_vec()),
            HasherState::Blake3(h) => Key::new(h.finalize().as_bytes().to_vec()),
        }
    }

    /// The algorithm this accumulator computes.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
}
