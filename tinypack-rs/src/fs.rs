//! File system collaborators.
//!
//! Module builds read sources through [`InputFileSystem`] and the compiler
//! writes rendered chunks through [`OutputFileSystem`]. [`NativeFileSystem`]
//! talks to the disk, [`MemoryFileSystem`] keeps everything in memory and is
//! what the tests and embedders without a disk use.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::paths::normalize_path;

/// Future returned by [`InputFileSystem::read_file`].
pub type ReadFuture = LocalBoxFuture<'static, io::Result<String>>;

/// Read side of the file system, used while building modules.
pub trait InputFileSystem {
    /// Reads a UTF-8 file. This is a suspension point of the build.
    fn read_file(&self, path: &Path) -> ReadFuture;

    /// Reads a UTF-8 file synchronously (used for template files).
    fn read_file_sync(&self, path: &Path) -> io::Result<String>;
}

/// Write side of the file system, used when emitting assets.
pub trait OutputFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// File system backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFileSystem;

impl InputFileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> ReadFuture {
        let path = path.to_path_buf();
        Box::pin(async move { tokio::fs::read_to_string(path).await })
    }

    fn read_file_sync(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

impl OutputFileSystem for NativeFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }
}

/// In-memory file system.
///
/// Paths are normalized on every access. Writing a file requires its parent
/// directory to have been created first, like on a real disk.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RefCell<BTreeMap<PathBuf, String>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns the file system, for building fixtures.
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Adds or replaces a file. Parent directories are created implicitly.
    pub fn insert(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        let path = normalize_path(path.as_ref());
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
        self.files.borrow_mut().insert(path, contents.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .borrow()
            .get(&normalize_path(path.as_ref()))
            .cloned()
    }

    pub fn contains_dir(&self, path: impl AsRef<Path>) -> bool {
        self.dirs.borrow().contains(&normalize_path(path.as_ref()))
    }

    /// All file paths currently stored, in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    fn add_dirs(&self, path: &Path) {
        let mut dirs = self.dirs.borrow_mut();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || !dirs.insert(ancestor.to_path_buf()) {
                break;
            }
        }
    }

    fn lookup(&self, path: &Path) -> io::Result<String> {
        self.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such file: {}", path.display()),
            )
        })
    }
}

impl InputFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> ReadFuture {
        let result = self.lookup(path);
        async move { result }.boxed_local()
    }

    fn read_file_sync(&self, path: &Path) -> io::Result<String> {
        self.lookup(path)
    }
}

impl OutputFileSystem for MemoryFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize_path(path);
        if self.files.borrow().contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Not a directory: {}", path.display()),
            ));
        }
        self.add_dirs(&path);
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let path = normalize_path(path);
        let parent_exists = path.parent().map_or(true, |parent| {
            parent.as_os_str().is_empty() || self.dirs.borrow().contains(parent)
        });
        if !parent_exists {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Parent directory does not exist: {}", path.display()),
            ));
        }
        self.files.borrow_mut().insert(path, contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_memory_read_normalizes_paths() {
        let fs = MemoryFileSystem::new().with_file("/project/src/index.js", "1;");
        let text = block_on(fs.read_file(Path::new("/project/lib/../src/./index.js"))).unwrap();
        assert_eq!(text, "1;");
        assert!(fs.contains_dir("/project/src"));
        assert!(fs.contains_dir("/project"));
    }

    #[test]
    fn test_memory_read_missing_file() {
        let fs = MemoryFileSystem::new();
        let err = block_on(fs.read_file(Path::new("/nope.js"))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_write_requires_directory() {
        let fs = MemoryFileSystem::new();
        let target = Path::new("/out/main.js");
        assert!(fs.write_file(target, "x").is_err());

        fs.create_dir_all(Path::new("/out")).unwrap();
        fs.write_file(target, "x").unwrap();
        assert_eq!(fs.get(target).as_deref(), Some("x"));
    }

    #[test]
    fn test_memory_create_dir_over_file_fails() {
        let fs = MemoryFileSystem::new().with_file("/out", "");
        let err = fs.create_dir_all(Path::new("/out")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
