use std::io::{Read, Write};

use cask_types::Key;
use rand::RngCore;

use crate::error::{KeyOrError, StoreResult};

/// Suffix marking an in-flight temporary object.
pub const TMP_SUFFIX: &str = "new";

/// Readable stream handed out by [`Medium::open`].
pub type BlobReader = Box<dyn Read + Send>;

/// Writable stream handed out by [`Medium::create`].
pub type BlobWriter = Box<dyn Write + Send>;

/// Converts a candidate location name into a key, or rejects it.
pub type KeyFilter<'a> = &'a (dyn Fn(&str) -> Option<Key> + Sync);

/// Receives listing elements. Returns `false` once nobody is listening.
pub type Publish<'a> = &'a mut dyn FnMut(KeyOrError) -> bool;

/// The capabilities a physical storage medium provides to a blob store.
///
/// Every operation works on opaque location names. How a [`Key`] maps to a
/// location is owned by the medium through [`keyname`](Self::keyname) and
/// [`tmp_keyname`](Self::tmp_keyname); the engine never builds names itself.
pub trait Medium: Send + Sync {
    /// Open a location for reading.
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// nothing exists under `name`.
    fn open(&self, name: &str) -> StoreResult<BlobReader>;

    /// Create a location and return a writer for its contents.
    fn create(&self, name: &str) -> StoreResult<BlobWriter>;

    /// Remove a location. Callers check [`exists`](Self::exists) first.
    fn delete(&self, name: &str) -> StoreResult<()>;

    /// Whether a location exists. Never fails.
    fn exists(&self, name: &str) -> bool;

    /// Atomically move `from` to `to`, creating any containers `to` needs.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Depth-first ordered traversal starting at `start` (the medium root
    /// when `None`).
    ///
    /// Each leaf name, with any trailing suffix removed, is passed to
    /// `filter`; accepted keys are handed to `publish`. On failure a single
    /// error element is published and `false` is returned. `false` is also
    /// returned when `publish` reports the consumer has gone away.
    fn list_to(&self, publish: Publish<'_>, filter: KeyFilter<'_>, start: Option<&str>) -> bool;

    /// Location of the finished object for `key`.
    fn keyname(&self, key: &Key) -> String;

    /// A fresh random temporary location, `size` random bytes wide.
    fn tmp_keyname(&self, size: usize) -> String;
}

/// Random hex text for temporary names.
pub(crate) fn random_hex(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    Key::new(bytes).to_hex()
}
