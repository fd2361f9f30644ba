//! Durable filesystem medium.
//!
//! Finished blobs live in a four-level directory tree sharded by the first
//! eight hex characters of their digest, which bounds every directory to at
//! most 256 children:
//!
//! ```text
//! <root>/aa/bb/cc/dd/aabbccdd<rest of digest>.blob   finished blob
//! <root>/<random hex>.new                              in-flight temporary
//! ```

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use cask_types::Key;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::FileOptions;
use crate::error::{StoreError, StoreResult};
use crate::medium::{random_hex, BlobReader, BlobWriter, KeyFilter, Medium, Publish, TMP_SUFFIX};

/// Suffix marking a finished blob.
pub const BLOB_SUFFIX: &str = "blob";

/// Number of two-character directory levels above each blob.
const SHARD_DEPTH: usize = 4;

/// A [`Medium`] backed by a directory on the local filesystem.
///
/// Location names are full path strings under the root directory, so the
/// root must be valid UTF-8.
#[derive(Clone, Debug)]
pub struct FileMedium {
    root: PathBuf,
    options: FileOptions,
}

impl FileMedium {
    /// Medium rooted at `root` with default permissions.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_options(root, FileOptions::default())
    }

    /// Medium rooted at `root` with explicit permissions and sync policy.
    ///
    /// Fails with [`StoreError::Config`] if `root` is not valid UTF-8.
    pub fn with_options(root: impl Into<PathBuf>, options: FileOptions) -> StoreResult<Self> {
        let root = root.into();
        if root.to_str().is_none() {
            return Err(StoreError::Config(format!(
                "store root {} is not valid UTF-8",
                root.display()
            )));
        }
        Ok(Self { root, options })
    }

    fn dir_builder(&self) -> DirBuilder {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.options.dir_mode);
        }
        builder
    }
}

impl Medium for FileMedium {
    fn open(&self, name: &str) -> StoreResult<BlobReader> {
        match File::open(name) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(&self, name: &str) -> StoreResult<BlobWriter> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.options.file_mode);
        }
        let file = options.open(name)?;
        Ok(Box::new(FileWriter {
            inner: BufWriter::new(file),
            sync: self.options.sync_on_flush,
        }))
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        fs::remove_file(name)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        // Only a definite "not found" counts as absent.
        match fs::metadata(name) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        }
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        if let Some(parent) = Path::new(to).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "creating shard directory");
                self.dir_builder().create(parent)?;
            }
        }
        fs::rename(from, to)?;
        Ok(())
    }

    fn list_to(&self, publish: Publish<'_>, filter: KeyFilter<'_>, start: Option<&str>) -> bool {
        let start = start.map(PathBuf::from).unwrap_or_else(|| self.root.clone());
        // The walk skips its own root at depth 0, so a start that is not a
        // readable directory would otherwise list as empty.
        if let Err(e) = fs::read_dir(&start) {
            warn!(start = %start.display(), error = %e, "cannot open listing root");
            publish(Err(StoreError::Io(e)));
            return false;
        }
        for entry in WalkDir::new(&start).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(start = %start.display(), error = %e, "directory walk failed");
                    publish(Err(StoreError::Io(io::Error::from(e))));
                    return false;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            let (stem, suffix) = match file_name.split_once('.') {
                Some((stem, suffix)) => (stem, Some(suffix)),
                None => (file_name, None),
            };
            if suffix == Some(TMP_SUFFIX) {
                continue;
            }
            if let Some(key) = filter(stem) {
                if !publish(Ok(key)) {
                    return false;
                }
            }
        }
        true
    }

    fn keyname(&self, key: &Key) -> String {
        let hex = key.to_hex();
        let mut path = self.root.clone();
        for level in 0..SHARD_DEPTH {
            match hex.get(level * 2..level * 2 + 2) {
                Some(segment) => path.push(segment),
                None => break,
            }
        }
        path.push(format!("{hex}.{BLOB_SUFFIX}"));
        // Lossless: the root was checked to be UTF-8 and the rest is hex.
        path.to_string_lossy().into_owned()
    }

    fn tmp_keyname(&self, size: usize) -> String {
        self.root
            .join(format!("{}.{TMP_SUFFIX}", random_hex(size)))
            .to_string_lossy()
            .into_owned()
    }
}

/// Buffered file writer that optionally syncs to disk on flush.
struct FileWriter {
    inner: BufWriter<File>,
    sync: bool,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        if self.sync {
            self.inner.get_ref().sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn temp_medium() -> (tempfile::TempDir, FileMedium) {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path()).unwrap();
        (dir, medium)
    }

    fn write_file(medium: &FileMedium, name: &str, data: &[u8]) {
        let mut writer = medium.create(name).unwrap();
        writer.write_all(data).unwrap();
        writer.flush().unwrap();
    }

    fn collect(medium: &FileMedium, start: Option<&str>) -> (bool, Vec<KeyOrErrorView>) {
        let filter = |name: &str| Key::from_hex(name).ok().filter(|k| k.len() == 20);
        let mut seen = Vec::new();
        let ok = medium.list_to(
            &mut |item| {
                seen.push(match item {
                    Ok(key) => KeyOrErrorView::Key(key.to_hex()),
                    Err(_) => KeyOrErrorView::Error,
                });
                true
            },
            &filter,
            start,
        );
        (ok, seen)
    }

    #[derive(Debug, PartialEq)]
    enum KeyOrErrorView {
        Key(String),
        Error,
    }

    #[test]
    fn keyname_shards_by_prefix() {
        let medium = FileMedium::new("").unwrap();
        let cases = [
            (
                "f648cdc2cee763f6cb9087a0580729712d93250e",
                "f6/48/cd/c2/f648cdc2cee763f6cb9087a0580729712d93250e.blob",
            ),
            (
                "a903cda4b5b93d3204af0fd6b7b92d24af1923a5",
                "a9/03/cd/a4/a903cda4b5b93d3204af0fd6b7b92d24af1923a5.blob",
            ),
        ];
        for (hex, expected) in cases {
            let name = medium.keyname(&Key::from_hex(hex).unwrap());
            assert_eq!(Path::new(&name), Path::new(expected));
        }
    }

    #[test]
    fn keyname_is_under_root() {
        let medium = FileMedium::new("/var/blobs").unwrap();
        let name = medium.keyname(&Key::from_hex("0102030405").unwrap());
        assert_eq!(
            Path::new(&name),
            Path::new("/var/blobs/01/02/03/04/0102030405.blob")
        );
    }

    #[test]
    fn keyname_tolerates_short_keys() {
        let medium = FileMedium::new("").unwrap();
        let name = medium.keyname(&Key::from_hex("abcd").unwrap());
        assert_eq!(Path::new(&name), Path::new("ab/cd/abcd.blob"));
    }

    #[test]
    fn tmp_keyname_lives_at_root() {
        let (dir, medium) = temp_medium();
        let tmp = medium.tmp_keyname(20);
        let path = Path::new(&tmp);
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(tmp.ends_with(".new"));
        assert_ne!(tmp, medium.tmp_keyname(20));
    }

    #[test]
    fn create_open_delete() {
        let (_dir, medium) = temp_medium();
        let name = medium.tmp_keyname(8);
        write_file(&medium, &name, b"file contents");
        assert!(medium.exists(&name));

        let mut out = Vec::new();
        medium.open(&name).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"file contents");

        medium.delete(&name).unwrap();
        assert!(!medium.exists(&name));
    }

    #[test]
    fn open_missing_is_not_found() {
        let (dir, medium) = temp_medium();
        let missing = dir.path().join("missing.blob");
        let err = medium.open(missing.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn delete_missing_is_io_error() {
        let (dir, medium) = temp_medium();
        let missing = dir.path().join("missing.blob");
        assert!(matches!(
            medium.delete(missing.to_str().unwrap()),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn rename_creates_shard_directories() {
        let (_dir, medium) = temp_medium();
        let tmp = medium.tmp_keyname(20);
        write_file(&medium, &tmp, b"Hola!");
        let key = Key::from_hex("f648cdc2cee763f6cb9087a0580729712d93250e").unwrap();
        let dest = medium.keyname(&key);

        medium.rename(&tmp, &dest).unwrap();
        assert!(!medium.exists(&tmp));
        assert!(medium.exists(&dest));
        assert!(Path::new(&dest).parent().unwrap().is_dir());
    }

    #[test]
    fn rename_over_existing_replaces() {
        let (_dir, medium) = temp_medium();
        let key = Key::from_hex("f648cdc2cee763f6cb9087a0580729712d93250e").unwrap();
        let dest = medium.keyname(&key);
        for _ in 0..2 {
            let tmp = medium.tmp_keyname(20);
            write_file(&medium, &tmp, b"Hola!");
            medium.rename(&tmp, &dest).unwrap();
        }
        let mut out = Vec::new();
        medium.open(&dest).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"Hola!");
    }

    #[test]
    fn list_is_ordered_and_skips_temporaries() {
        let (dir, medium) = temp_medium();
        let hexes = [
            "f648cdc2cee763f6cb9087a0580729712d93250e",
            "a903cda4b5b93d3204af0fd6b7b92d24af1923a5",
            "a903cda4000000000000000000000000000000ff",
            "0000000000000000000000000000000000000001",
        ];
        for hex in hexes {
            let tmp = medium.tmp_keyname(20);
            write_file(&medium, &tmp, hex.as_bytes());
            medium
                .rename(&tmp, &medium.keyname(&Key::from_hex(hex).unwrap()))
                .unwrap();
        }
        // An in-flight temporary and some foreign files.
        write_file(&medium, &medium.tmp_keyname(20), b"partial");
        fs::write(dir.path().join("README.txt"), b"not a blob").unwrap();
        fs::write(dir.path().join("abcd.blob"), b"wrong length").unwrap();

        let (ok, seen) = collect(&medium, None);
        assert!(ok);
        let mut expected: Vec<&str> = hexes.to_vec();
        expected.sort();
        let expected: Vec<KeyOrErrorView> = expected
            .into_iter()
            .map(|h| KeyOrErrorView::Key(h.to_string()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn list_from_subdirectory() {
        let (dir, medium) = temp_medium();
        for hex in [
            "a903cda4b5b93d3204af0fd6b7b92d24af1923a5",
            "f648cdc2cee763f6cb9087a0580729712d93250e",
        ] {
            let tmp = medium.tmp_keyname(20);
            write_file(&medium, &tmp, b"x");
            medium
                .rename(&tmp, &medium.keyname(&Key::from_hex(hex).unwrap()))
                .unwrap();
        }
        let start = dir.path().join("f6");
        let (ok, seen) = collect(&medium, start.to_str());
        assert!(ok);
        assert_eq!(
            seen,
            vec![KeyOrErrorView::Key(
                "f648cdc2cee763f6cb9087a0580729712d93250e".into()
            )]
        );
    }

    #[test]
    fn list_of_missing_root_ends_with_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("does-not-exist")).unwrap();
        let (ok, seen) = collect(&medium, None);
        assert!(!ok);
        assert_eq!(seen, vec![KeyOrErrorView::Error]);
    }

    #[test]
    fn list_of_regular_file_root_ends_with_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"plain file").unwrap();
        let medium = FileMedium::new(&root).unwrap();
        let (ok, seen) = collect(&medium, None);
        assert!(!ok);
        assert_eq!(seen, vec![KeyOrErrorView::Error]);
    }

    #[test]
    fn list_stops_when_publish_refuses() {
        let (_dir, medium) = temp_medium();
        for hex in [
            "a903cda4b5b93d3204af0fd6b7b92d24af1923a5",
            "f648cdc2cee763f6cb9087a0580729712d93250e",
        ] {
            let tmp = medium.tmp_keyname(20);
            write_file(&medium, &tmp, b"x");
            medium
                .rename(&tmp, &medium.keyname(&Key::from_hex(hex).unwrap()))
                .unwrap();
        }
        let filter = |name: &str| Key::from_hex(name).ok();
        let mut published = 0;
        let ok = medium.list_to(
            &mut |_| {
                published += 1;
                false
            },
            &filter,
            None,
        );
        assert!(!ok);
        assert_eq!(published, 1);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_root_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new(OsStr::from_bytes(b"/tmp/blobs-\xff"));
        assert!(matches!(FileMedium::new(root), Err(StoreError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn permissions_follow_options() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, medium) = temp_medium();
        let tmp = medium.tmp_keyname(20);
        write_file(&medium, &tmp, b"perm");
        let file_mode = fs::metadata(&tmp).unwrap().permissions().mode() & 0o777;
        // The process umask can only clear bits.
        assert_eq!(file_mode & !FileOptions::default().file_mode, 0);

        let dest = medium.keyname(&Key::from_hex("0102030405").unwrap());
        medium.rename(&tmp, &dest).unwrap();
        let shard = dir.path().join("01");
        let dir_mode = fs::metadata(shard).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode & !FileOptions::default().dir_mode, 0);
    }

    #[test]
    fn sync_on_flush_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::with_options(
            dir.path(),
            FileOptions {
                sync_on_flush: true,
                ..FileOptions::default()
            },
        )
        .unwrap();
        let name = medium.tmp_keyname(4);
        write_file(&medium, &name, b"synced");
        assert_eq!(fs::read(&name).unwrap(), b"synced");
    }
}
