//! Integrity-checking reader for stored blobs.

use std::io::{self, Read};

use cask_crypto::ContentHasher;
use cask_types::Key;

/// Digest mismatch found at the end of a verified read.
///
/// Travels inside an [`io::Error`] of kind [`io::ErrorKind::InvalidData`] so
/// it can be told apart from an ordinary end of stream and from other I/O
/// failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("corrupted blob: expected hash was {expected} but got {actual}")]
pub struct CorruptedBlob {
    pub expected: Key,
    pub actual: Key,
}

impl CorruptedBlob {
    /// The corruption carried by `err`, if it is one.
    pub fn from_io(err: &io::Error) -> Option<&CorruptedBlob> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<CorruptedBlob>())
    }

    fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }
}

/// Reader that verifies the bytes it delivers hash to an expected key.
///
/// Every byte handed to the caller is also fed to the accumulator. When the
/// inner stream reports end of stream the digest is compared with the
/// expected key and, on mismatch, the end of stream is replaced by a
/// [`CorruptedBlob`] error. A caller that stops before end of stream gets
/// no verification.
pub struct CheckedReader<R> {
    inner: R,
    expected: Key,
    hasher: Option<ContentHasher>,
    mismatch: Option<CorruptedBlob>,
}

impl<R: Read> CheckedReader<R> {
    /// Wrap `inner`, expecting its full contents to hash to `expected`.
    pub fn new(inner: R, expected: Key, hasher: ContentHasher) -> Self {
        Self {
            inner,
            expected,
            hasher: Some(hasher),
            mismatch: None,
        }
    }

    fn verify(&mut self) -> io::Result<()> {
        if let Some(hasher) = self.hasher.take() {
            let actual = hasher.finalize();
            if actual != self.expected {
                self.mismatch = Some(CorruptedBlob {
                    expected: self.expected.clone(),
                    actual,
                });
            }
        }
        match &self.mismatch {
            Some(corrupted) => Err(corrupted.clone().into_io()),
            None => Ok(()),
        }
    }
}

impl<R: Read> Read for CheckedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            return Ok(n);
        }
        self.verify()?;
        Ok(0)
    }
}

impl<R> std::fmt::Debug for CheckedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedReader")
            .field("expected", &self.expected)
            .field("finished", &self.hasher.is_none())
            .finish()
    }
}
