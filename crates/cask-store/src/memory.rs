//! In-memory storage medium for tests and in-process caching.
//!
//! [`MemoryMedium`] keeps every location in a `HashMap` plus a separately
//! maintained sorted index of location names, so listings come out in
//! ascending order without re-sorting. Content-addressed blobs are immutable,
//! which makes this medium a perfect cache. Data is lost when it is dropped.

use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use cask_types::Key;

use crate::error::{StoreError, StoreResult};
use crate::medium::{random_hex, BlobReader, BlobWriter, KeyFilter, Medium, Publish, TMP_SUFFIX};

const INITIAL_BUFFER: usize = 64;

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Location names kept in ascending order.
///
/// Insertion and removal locate their slot by binary search and shift the
/// tail, so the list stays sorted without ever being re-sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SortedNames {
    names: Vec<String>,
}

impl SortedNames {
    /// Insert `name` at its ordered position. Returns `false` if already present.
    pub(crate) fn insert(&mut self, name: &str) -> bool {
        match self.names.binary_search_by(|probe| probe.as_str().cmp(name)) {
            Ok(_) => false,
            Err(index) => {
                self.names.insert(index, name.to_string());
                true
            }
        }
    }

    /// Remove `name`, closing the gap. Returns `false` if it was absent.
    pub(crate) fn extract(&mut self, name: &str) -> bool {
        match self.names.binary_search_by(|probe| probe.as_str().cmp(name)) {
            Ok(index) => {
                self.names.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}

#[derive(Default)]
struct MemoryState {
    blobs: HashMap<String, SharedBuffer>,
    index: SortedNames,
}

/// A [`Medium`] that lives entirely in memory.
///
/// All state sits behind a single mutex, so one instance can be shared by
/// concurrent store operations.
#[derive(Default)]
pub struct MemoryMedium {
    state: Mutex<MemoryState>,
}

impl MemoryMedium {
    /// Create a new empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locations currently held, temporaries included.
    pub fn len(&self) -> usize {
        self.lock_recovering().index.len()
    }

    /// Returns `true` if the medium holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every location name, in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.lock_recovering().index.as_slice().to_vec()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// For the infallible queries: a poisoned map is still a consistent map.
    fn lock_recovering(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Medium for MemoryMedium {
    fn open(&self, name: &str) -> StoreResult<BlobReader> {
        let buffer = self
            .lock()?
            .blobs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let contents = buffer.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Box::new(Cursor::new(Bytes::copy_from_slice(&contents))))
    }

    fn create(&self, name: &str) -> StoreResult<BlobWriter> {
        let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::with_capacity(INITIAL_BUFFER)));
        let mut state = self.lock()?;
        state.blobs.insert(name.to_string(), Arc::clone(&buffer));
        state.index.insert(name);
        Ok(Box::new(BufferWriter { buffer }))
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.blobs.remove(name);
        state.index.extract(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.lock_recovering().blobs.contains_key(name)
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        let buffer = state
            .blobs
            .get(from)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        if from == to {
            return Ok(());
        }
        state.blobs.insert(to.to_string(), buffer);
        state.index.insert(to);
        state.blobs.remove(from);
        state.index.extract(from);
        Ok(())
    }

    fn list_to(&self, publish: Publish<'_>, filter: KeyFilter<'_>, start: Option<&str>) -> bool {
        // Never hold the lock across a publish: it blocks until the consumer takes the key.
        let names = self.names();
        for name in names {
            if start.is_some_and(|prefix| !name.starts_with(prefix)) {
                continue;
            }
            if let Some(key) = filter(&name) {
                if !publish(Ok(key)) {
                    return false;
                }
            }
        }
        true
    }

    fn keyname(&self, key: &Key) -> String {
        key.to_hex()
    }

    fn tmp_keyname(&self, size: usize) -> String {
        format!("{}.{TMP_SUFFIX}", random_hex(size))
    }
}

impl std::fmt::Debug for MemoryMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMedium")
            .field("location_count", &self.len())
            .finish()
    }
}

/// Appends into a shared in-memory buffer.
struct BufferWriter {
    buffer: SharedBuffer,
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut contents = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory buffer lock poisoned"))?;
        contents.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
