//! Filesystem capability.
//!
//! Orchestrators never touch `std::fs` directly; they go through a
//! [`FileSystem`] so that hosts can sandbox access and tests can run
//! against [`MemoryFileSystem`].

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Minimal filesystem surface used by the toolchain.
pub trait FileSystem: Send + Sync {
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is an existing regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Read a UTF-8 text file.
    fn read_text(&self, path: &Path) -> io::Result<String>;

    /// Write a text file, creating parent directories as needed.
    ///
    /// Implementations must not leave a partially written file behind on failure.
    fn write_text(&self, path: &Path, content: &str) -> io::Result<()>;

    /// `dir` followed by each of its ancestors up to the root.
    fn walk_up_from(&self, dir: &Path) -> Vec<PathBuf> {
        dir.ancestors().map(Path::to_path_buf).collect()
    }
}

/// [`FileSystem`] backed by the real disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_text(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_text(&self, path: &Path, content: &str) -> io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        // Write next to the destination and rename into place
        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-memory [`FileSystem`] for tests and embedding.
///
/// Paths are stored verbatim; directories exist implicitly as prefixes of
/// stored files or when added with [`MemoryFileSystem::add_dir`].
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    read_only: Mutex<Vec<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style file insertion.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Insert or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.lock().insert(path.into(), content.into());
    }

    /// Register an empty directory.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.lock().insert(path.into());
    }

    /// Make every write under `prefix` fail with `PermissionDenied`.
    pub fn deny_writes_under(&self, prefix: impl Into<PathBuf>) {
        self.read_only.lock().push(prefix.into());
    }

    /// Current content of a file, if present.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    /// All stored file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        if self.files.lock().contains_key(path) {
            return true;
        }
        if self.dirs.lock().iter().any(|d| d.starts_with(path)) {
            return true;
        }
        self.files
            .lock()
            .keys()
            .any(|f| f != path && f.starts_with(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn read_text(&self, path: &Path) -> io::Result<String> {
        self.files.lock().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such file", path.display()),
            )
        })
    }

    fn write_text(&self, path: &Path, content: &str) -> io::Result<()> {
        if self.read_only.lock().iter().any(|p| path.starts_with(p)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", path.display()),
            ));
        }
        self.files
            .lock()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_up_is_inclusive_and_reaches_root() {
        let fs = MemoryFileSystem::new();
        let dirs = fs.walk_up_from(Path::new("/a/b/c"));
        assert_eq!(dirs.first(), Some(&PathBuf::from("/a/b/c")));
        assert_eq!(dirs.last(), Some(&PathBuf::from("/")));
        assert_eq!(dirs.len(), 4);
    }

    #[test]
    fn test_memory_fs_directories_are_implicit() {
        let fs = MemoryFileSystem::new().with_file("/proj/src/main.ts", "let x = 1;");
        assert!(fs.exists(Path::new("/proj")));
        assert!(fs.exists(Path::new("/proj/src")));
        assert!(!fs.is_file(Path::new("/proj/src")));
        assert!(fs.is_file(Path::new("/proj/src/main.ts")));
        assert!(!fs.exists(Path::new("/other")));
    }

    #[test]
    fn test_memory_fs_denied_writes() {
        let fs = MemoryFileSystem::new();
        fs.deny_writes_under("/locked");
        let err = fs
            .write_text(Path::new("/locked/out.js"), "x")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(fs.get(Path::new("/locked/out.js")).is_none());
    }

    #[test]
    fn test_std_fs_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/out.js");
        StdFileSystem.write_text(&target, "console.log(1);").unwrap();
        assert_eq!(
            StdFileSystem.read_text(&target).unwrap(),
            "console.log(1);"
        );
        assert!(StdFileSystem.is_file(&target));
    }

    #[test]
    fn test_std_fs_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tsconfig.json");
        StdFileSystem.write_text(&target, "{}").unwrap();
        StdFileSystem.write_text(&target, "{\"a\":1}").unwrap();
        assert_eq!(StdFileSystem.read_text(&target).unwrap(), "{\"a\":1}");
    }
}
