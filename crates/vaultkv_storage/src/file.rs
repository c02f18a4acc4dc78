//! File-based physical backend for persistent storage.

use crate::backend::{Entry, PhysicalBackend};
use crate::context::Context;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Prefix for files holding values, so `a` and `a/b` can coexist.
const VALUE_FILE_PREFIX: char = '_';
/// Prefix for directories holding key segments. Differs from
/// [`VALUE_FILE_PREFIX`] so no key segment can name both.
const DIRECTORY_PREFIX: char = '+';
/// Suffix of in-flight writes before they are renamed into place.
const TEMP_FILE_SUFFIX: &str = ".tmp";

/// A file-based physical backend.
///
/// Every key maps to one file below the root directory. The slash-separated
/// segments of a key become directories named `+<segment>` and the final
/// segment becomes a file named `_<segment>`. Data survives process restarts.
///
/// # Durability
///
/// - `put` writes to a temporary file, calls `File::sync_all()`, then renames
///   it over the previous value so readers never observe a partial write
/// - `delete` removes the file and any directories it leaves empty
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
/// Internal locking keeps listings consistent with concurrent writers.
///
/// # Example
///
/// ```no_run
/// use vaultkv_storage::{Context, Entry, FileBackend, PhysicalBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("/var/lib/vaultkv")).unwrap();
/// backend.put(&Context::background(), &Entry::new("core/seal", vec![1])).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    lock: RwLock<()>,
}

impl FileBackend {
    /// Opens or creates a file backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or `root`
    /// exists but is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        if !fs::metadata(root)?.is_dir() {
            return Err(StorageError::invalid_config(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
            lock: RwLock::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Maps a key to its directory and value file path.
    fn key_path(&self, key: &str) -> StorageResult<(PathBuf, PathBuf)> {
        validate_key(key)?;

        let (dir, name) = match key.rsplit_once('/') {
            Some((dir, name)) => (self.dir_path(dir), name),
            None => (self.root.clone(), key),
        };
        let file = dir.join(format!("{VALUE_FILE_PREFIX}{name}"));
        Ok((dir, file))
    }

    /// Maps the directory part of a key (`a/b`) to `root/+a/+b`.
    fn dir_path(&self, dir: &str) -> PathBuf {
        dir.split('/')
            .fold(self.root.clone(), |path, segment| {
                path.join(format!("{DIRECTORY_PREFIX}{segment}"))
            })
    }

    /// Removes empty directories from `dir` up to (not including) the root.
    fn prune_empty_dirs(&self, mut dir: &Path) {
        while dir != self.root && dir.starts_with(&self.root) {
            // Fails when the directory still has children, which ends the walk
            if fs::remove_dir(dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    /// Recursively collects keys below `dir`, whose key form is `key_prefix`.
    fn collect_keys(
        &self,
        ctx: &Context,
        dir: &Path,
        key_prefix: &str,
        out: &mut Vec<String>,
    ) -> StorageResult<()> {
        ctx.check()?;

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for dir_entry in entries {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if dir_entry.file_type()?.is_dir() {
                if let Some(segment) = name.strip_prefix(DIRECTORY_PREFIX) {
                    let child_prefix = format!("{key_prefix}{segment}/");
                    self.collect_keys(ctx, &dir_entry.path(), &child_prefix, out)?;
                }
            } else if let Some(stripped) = name.strip_prefix(VALUE_FILE_PREFIX) {
                if !stripped.ends_with(TEMP_FILE_SUFFIX) {
                    out.push(format!("{key_prefix}{stripped}"));
                }
            }
        }
        Ok(())
    }
}

/// Rejects keys that cannot be mapped safely onto the file system.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key(key, "key is empty"));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(StorageError::invalid_key(
            key,
            "key must not start or end with '/'",
        ));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::invalid_key(
                key,
                "key contains an empty or relative segment",
            ));
        }
        if segment.contains('\\') || segment.contains('\0') {
            return Err(StorageError::invalid_key(key, "key contains a reserved character"));
        }
    }
    if key.ends_with(TEMP_FILE_SUFFIX) {
        return Err(StorageError::invalid_key(key, "key uses a reserved suffix"));
    }
    Ok(())
}

impl PhysicalBackend for FileBackend {
    fn put(&self, ctx: &Context, entry: &Entry) -> StorageResult<()> {
        let (dir, file_path) = self.key_path(&entry.key)?;
        ctx.check()?;

        let _guard = self.lock.write();
        fs::create_dir_all(&dir)?;

        let mut temp_name = file_path.clone().into_os_string();
        temp_name.push(TEMP_FILE_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&entry.value)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &file_path)?;
        Ok(())
    }

    fn get(&self, ctx: &Context, key: &str) -> StorageResult<Option<Entry>> {
        let (_, file_path) = self.key_path(key)?;
        ctx.check()?;

        let _guard = self.lock.read();
        let mut file = match File::open(&file_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut value = Vec::new();
        file.read_to_end(&mut value)?;
        Ok(Some(Entry::new(key, value)))
    }

    fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        let (dir, file_path) = self.key_path(key)?;
        ctx.check()?;

        let _guard = self.lock.write();
        match fs::remove_file(&file_path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        self.prune_empty_dirs(&dir);
        Ok(())
    }

    fn list(&self, ctx: &Context, prefix: &str) -> StorageResult<Vec<String>> {
        ctx.check()?;

        // Only walk the deepest directory the prefix fully names
        let (dir_part, start_dir) = match prefix.rsplit_once('/') {
            Some((dir, _)) => (format!("{dir}/"), self.dir_path(dir)),
            None => (String::new(), self.root.clone()),
        };
        if dir_part.split('/').any(|segment| segment == "..") {
            return Err(StorageError::invalid_key(prefix, "prefix contains a relative segment"));
        }

        let _guard = self.lock.read();
        let mut keys = Vec::new();
        self.collect_keys(ctx, &start_dir, &dir_part, &mut keys)?;

        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx() -> Context {
        Context::background()
    }

    #[test]
    fn file_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("store");

        let backend = FileBackend::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.path(), root.as_path());
    }

    #[test]
    fn file_open_rejects_regular_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, b"x").unwrap();

        assert!(FileBackend::open(&path).is_err());
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend
            .put(&ctx(), &Entry::new("a/b/c", b"hello".to_vec()))
            .unwrap();
        let entry = backend.get(&ctx(), "a/b/c").unwrap().unwrap();
        assert_eq!(entry.value, b"hello");
        assert!(backend.get(&ctx(), "a/b").unwrap().is_none());
    }

    #[test]
    fn file_key_and_directory_coexist() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put(&ctx(), &Entry::new("a", b"1".to_vec())).unwrap();
        backend.put(&ctx(), &Entry::new("a/b", b"2".to_vec())).unwrap();

        assert_eq!(backend.get(&ctx(), "a").unwrap().unwrap().value, b"1");
        assert_eq!(backend.get(&ctx(), "a/b").unwrap().unwrap().value, b"2");
    }

    #[test]
    fn file_value_and_directory_names_never_collide() {
        let dir = tempdir().unwrap();

        // Directory first, then a value whose file name matches it raw
        let backend = FileBackend::open(&dir.path().join("dir-first")).unwrap();
        backend.put(&ctx(), &Entry::new("_x/y", b"nested".to_vec())).unwrap();
        backend.put(&ctx(), &Entry::new("x", b"leaf".to_vec())).unwrap();
        assert_eq!(backend.get(&ctx(), "x").unwrap().unwrap().value, b"leaf");
        assert_eq!(backend.get(&ctx(), "_x/y").unwrap().unwrap().value, b"nested");
        assert_eq!(backend.list(&ctx(), "").unwrap(), vec!["_x/y", "x"]);

        // And the other order
        let backend = FileBackend::open(&dir.path().join("value-first")).unwrap();
        backend.put(&ctx(), &Entry::new("x", b"leaf".to_vec())).unwrap();
        backend.put(&ctx(), &Entry::new("_x/y", b"nested".to_vec())).unwrap();
        assert_eq!(backend.get(&ctx(), "x").unwrap().unwrap().value, b"leaf");
        assert_eq!(backend.get(&ctx(), "_x/y").unwrap().unwrap().value, b"nested");
        assert_eq!(backend.list(&ctx(), "_x/").unwrap(), vec!["_x/y"]);

        backend.delete(&ctx(), "_x/y").unwrap();
        assert_eq!(backend.list(&ctx(), "").unwrap(), vec!["x"]);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend
                .put(&ctx(), &Entry::new("core/keyring", b"persistent data".to_vec()))
                .unwrap();
        }

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            let entry = backend.get(&ctx(), "core/keyring").unwrap().unwrap();
            assert_eq!(entry.value, b"persistent data");
        }
    }

    #[test]
    fn file_delete_prunes_directories() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put(&ctx(), &Entry::new("x/y/z", b"v".to_vec())).unwrap();
        backend.delete(&ctx(), "x/y/z").unwrap();

        assert!(backend.get(&ctx(), "x/y/z").unwrap().is_none());
        assert!(!dir.path().join(format!("{DIRECTORY_PREFIX}x")).exists());

        // Deleting a missing key is fine
        backend.delete(&ctx(), "x/y/z").unwrap();
    }

    #[test]
    fn file_list_prefix() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        for key in ["app/one", "app/two", "app/nested/three", "apple", "other/x"] {
            backend.put(&ctx(), &Entry::new(key, vec![1])).unwrap();
        }

        assert_eq!(
            backend.list(&ctx(), "app/").unwrap(),
            vec!["app/nested/three", "app/one", "app/two"]
        );
        assert_eq!(backend.list(&ctx(), "app").unwrap().len(), 4);
        assert_eq!(backend.list(&ctx(), "").unwrap().len(), 5);
        assert_eq!(backend.list(&ctx(), "app/t").unwrap(), vec!["app/two"]);
        assert!(backend.list(&ctx(), "missing/").unwrap().is_empty());
    }

    #[test]
    fn file_rejects_bad_keys() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        for key in ["", "/abs", "trailing/", "a//b", "../escape", "a/./b", "x.tmp"] {
            let result = backend.put(&ctx(), &Entry::new(key, vec![1]));
            assert!(
                matches!(result, Err(StorageError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn file_cancelled_context_writes_nothing() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let ctx = Context::background();
        ctx.cancel();

        let result = backend.put(&ctx, &Entry::new("k", b"v".to_vec()));
        assert!(matches!(result, Err(StorageError::Canceled)));
        assert!(backend.list(&Context::background(), "").unwrap().is_empty());
    }
}
