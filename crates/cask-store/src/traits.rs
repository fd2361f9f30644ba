use std::io::Read;

use cask_types::Key;

use crate::error::StoreResult;
use crate::medium::BlobReader;
use crate::stream::KeyStream;

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. The key is derived from the content,
///   so writing identical content twice stores it once and returns the same
///   key.
/// - A blob only becomes visible under its key once it is completely written.
/// - Reads verify content against the requested key at end of stream.
/// - All medium errors are propagated, never silently ignored.
pub trait BlobStore: Send + Sync {
    /// Open a verified reader for the blob stored under `key`.
    ///
    /// Fails with `ShortKey` for keys shorter than the digest size and with
    /// `NotFound` when no such blob exists. Corruption surfaces from the
    /// reader's final read.
    fn read(&self, key: &Key) -> StoreResult<BlobReader>;

    /// Store everything `blob` yields and return its key.
    fn write(&self, blob: &mut dyn Read) -> StoreResult<Key>;

    /// Lazily enumerate stored keys in the medium's order.
    ///
    /// An error element ends the sequence.
    fn list(&self) -> KeyStream;
}

/// A [`BlobStore`] that can also remove blobs.
///
/// Removal is usually reserved for a garbage collector acting on some
/// retention policy.
pub trait BlobAdmin: BlobStore {
    /// Remove the blob stored under `key`. Removing an absent key succeeds.
    fn remove(&self, key: &Key) -> StoreResult<()>;
}
