use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cask_crypto::{ContentHasher, HashAlgorithm};
use cask_types::Key;
use tracing::{debug, warn};

use crate::checked::CheckedReader;
use crate::config::{BackendConfig, StoreConfig};
use crate::error::{KeyOrError, StoreError, StoreResult};
use crate::file::FileMedium;
use crate::medium::{BlobReader, Medium};
use crate::memory::MemoryMedium;
use crate::stream::KeyStream;
use crate::traits::{BlobAdmin, BlobStore};

const COPY_CHUNK: usize = 8 * 1024;

/// The blob store engine: a [`Medium`] bound to a [`HashAlgorithm`].
///
/// The engine holds no per-call state, so one instance (or its clones, which
/// share the medium) may serve concurrent operations.
#[derive(Clone)]
pub struct BlobEngine {
    medium: Arc<dyn Medium>,
    algorithm: HashAlgorithm,
}

impl BlobEngine {
    /// Attach `medium` with keys derived by `algorithm`.
    pub fn new(medium: Arc<dyn Medium>, algorithm: HashAlgorithm) -> Self {
        Self { medium, algorithm }
    }

    /// Engine over a [`FileMedium`] rooted at `root`.
    pub fn file(root: impl Into<PathBuf>, algorithm: HashAlgorithm) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(FileMedium::new(root)?), algorithm))
    }

    /// Engine over a fresh [`MemoryMedium`].
    pub fn memory(algorithm: HashAlgorithm) -> Self {
        Self::new(Arc::new(MemoryMedium::new()), algorithm)
    }

    /// Engine described by `config`.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let medium: Arc<dyn Medium> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryMedium::new()),
            BackendConfig::File { root } => {
                Arc::new(FileMedium::with_options(root.clone(), config.file)?)
            }
        };
        Ok(Self::new(medium, config.algorithm))
    }

    /// The algorithm keys are derived with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The attached medium.
    pub fn medium(&self) -> &Arc<dyn Medium> {
        &self.medium
    }

    /// Whether a blob is stored under `key`.
    pub fn contains(&self, key: &Key) -> bool {
        key.len() >= self.algorithm.digest_size() && self.medium.exists(&self.medium.keyname(key))
    }
}

impl BlobStore for BlobEngine {
    fn read(&self, key: &Key) -> StoreResult<BlobReader> {
        let expected = self.algorithm.digest_size();
        if key.len() < expected {
            return Err(StoreError::ShortKey {
                expected,
                actual: key.len(),
            });
        }
        let stream = self.medium.open(&self.medium.keyname(key))?;
        Ok(Box::new(CheckedReader::new(
            stream,
            key.clone(),
            self.algorithm.hasher(),
        )))
    }

    fn write(&self, blob: &mut dyn Read) -> StoreResult<Key> {
        let tmp = self.medium.tmp_keyname(self.algorithm.digest_size());
        let mut writer = self.medium.create(&tmp)?;
        let mut hasher = self.algorithm.hasher();
        let bytes = match copy_hashing(blob, &mut writer, &mut hasher) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(tmp = %tmp, error = %e, "blob write failed, temporary left behind");
                return Err(e.into());
            }
        };
        drop(writer);

        let key = hasher.finalize();
        let keyname = self.medium.keyname(&key);
        if self.medium.exists(&keyname) {
            self.medium.delete(&tmp)?;
            debug!(key = %key, bytes, dedup = true, "blob already stored");
        } else {
            self.medium.rename(&tmp, &keyname)?;
            debug!(key = %key, bytes, dedup = false, "blob stored");
        }
        Ok(key)
    }

    fn list(&self) -> KeyStream {
        let (sender, receiver) = mpsc::sync_channel(0);
        let medium = Arc::clone(&self.medium);
        let algorithm = self.algorithm;
        let spawned = thread::Builder::new()
            .name("cask-list".into())
            .spawn(move || {
                let filter = move |name: &str| accept(algorithm, name);
                let mut failed = false;
                let mut publish = |item: KeyOrError| {
                    failed |= item.is_err();
                    sender.send(item).is_ok()
                };
                let clean = medium.list_to(&mut publish, &filter, None);
                if clean {
                    debug!(algorithm = %algorithm, "blob listing finished");
                } else if failed {
                    warn!(algorithm = %algorithm, "blob listing failed");
                } else {
                    debug!(algorithm = %algorithm, "blob listing abandoned by consumer");
                }
            });
        match spawned {
            Ok(_) => KeyStream::new(receiver),
            Err(e) => KeyStream::failed(e.into()),
        }
    }
}

impl BlobAdmin for BlobEngine {
    fn remove(&self, key: &Key) -> StoreResult<()> {
        if key.len() < self.algorithm.digest_size() {
            return Ok(());
        }
        let keyname = self.medium.keyname(key);
        if !self.medium.exists(&keyname) {
            return Ok(());
        }
        match self.medium.delete(&keyname) {
            Ok(()) => {
                debug!(key = %key, "blob removed");
                Ok(())
            }
            // Lost a race with another remover.
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for BlobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobEngine")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Turn a candidate location name into a key if it is hex of the digest size.
fn accept(algorithm: HashAlgorithm, name: &str) -> Option<Key> {
    Key::from_hex(name)
        .ok()
        .filter(|key| key.len() == algorithm.digest_size())
}

/// Single pass: every chunk goes to both the medium and the digest.
fn copy_hashing(
    source: &mut dyn Read,
    sink: &mut dyn Write,
    hasher: &mut ContentHasher,
) -> io::Result<u64> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    sink.flush()?;
    Ok(total)
}

/// A filesystem store that can only read, write and list.
pub fn file_blob_store(
    root: impl Into<PathBuf>,
    algorithm: HashAlgorithm,
) -> StoreResult<Arc<dyn BlobStore>> {
    Ok(Arc::new(BlobEngine::file(root, algorithm)?))
}

/// A filesystem store that can also remove.
pub fn file_blob_admin(
    root: impl Into<PathBuf>,
    algorithm: HashAlgorithm,
) -> StoreResult<Arc<dyn BlobAdmin>> {
    Ok(Arc::new(BlobEngine::file(root, algorithm)?))
}

/// An in-memory store that can only read, write and list.
pub fn memory_blob_store(algorithm: HashAlgorithm) -> Arc<dyn BlobStore> {
    Arc::new(BlobEngine::memory(algorithm))
}

/// An in-memory store that can also remove.
pub fn memory_blob_admin(algorithm: HashAlgorithm) -> Arc<dyn BlobAdmin> {
    Arc::new(BlobEngine::memory(algorithm))
}
