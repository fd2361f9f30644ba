use std::io;

use cask_types::Key;

use crate::checked::CorruptedBlob;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The supplied key is shorter than the store's digest size.
    #[error("expected a {expected} bytes long hash key, but got just {actual} bytes")]
    ShortKey { expected: usize, actual: usize },

    /// No object exists at the given location name.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Content hash mismatch detected at end of a verified read.
    #[error("corrupted blob: expected hash was {expected} but got {actual}")]
    Corrupted { expected: Key, actual: Key },

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A medium lock was poisoned by a panicking holder.
    #[error("medium lock poisoned")]
    LockPoisoned,
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        if let Some(corrupted) = CorruptedBlob::from_io(&err) {
            return Self::Corrupted {
                expected: corrupted.expected.clone(),
                actual: corrupted.actual.clone(),
            };
        }
        Self::Io(err)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One element of a key listing: a key, or the error that ended the listing.
pub type KeyOrError = StoreResult<Key>;
