//! Content-addressed blob storage.
//!
//! A blob is identified only by the digest of its bytes. The store offers
//! four operations: read, write, list and remove. The storage protocol
//! (hashing, atomic publication, corruption detection, key-to-location
//! mapping, ordered enumeration) is written once in [`BlobEngine`] against
//! the [`Medium`] capability set, and the physical medium is pluggable.
//!
//! # Storage Media
//!
//! - [`FileMedium`] -- durable storage in a directory tree sharded by digest prefix
//! - [`MemoryMedium`] -- `HashMap` plus sorted index, for tests and caching
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content-addressing guarantees this).
//! 2. Write-then-rename: content goes to a temporary location and is renamed
//!    into place only after its key is known.
//! 3. Reads are verified: a blob whose bytes no longer hash to its key fails
//!    the final read with a corruption error.
//! 4. Removing an absent key is not an error.
//! 5. All I/O errors are propagated, never silently ignored. A failed write
//!    may leave its temporary behind for an external collector to reclaim.

pub mod checked;
pub mod config;
pub mod engine;
pub mod error;
pub mod file;
pub mod medium;
pub mod memory;
pub mod stream;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cask_crypto::HashAlgorithm;
pub use cask_types::Key;
pub use checked::{CheckedReader, CorruptedBlob};
pub use config::{BackendConfig, FileOptions, StoreConfig};
pub use engine::{
    file_blob_admin, file_blob_store, memory_blob_admin, memory_blob_store, BlobEngine,
};
pub use error::{KeyOrError, StoreError, StoreResult};
pub use file::FileMedium;
pub use medium::{BlobReader, BlobWriter, Medium};
pub use memory::MemoryMedium;
pub use stream::KeyStream;
pub use traits::{BlobAdmin, BlobStore};
