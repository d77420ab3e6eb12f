//! Filesystem access used by discovery and pattern instantiation.
//!
//! The core never touches the disk directly; it goes through a
//! [`FileSystem`] so that scans can be run against an in-memory tree in
//! tests and so callers can wrap the real filesystem with their own policy.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Read-only view of a file tree.
pub trait FileSystem: Send + Sync {
    /// Read a whole file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing, unreadable or not UTF-8.
    fn read_text(&self, path: &Utf8Path) -> io::Result<String>;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Whether `path` is a regular file.
    fn is_file(&self, path: &Utf8Path) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Utf8Path) -> bool;

    /// Immediate children of `path`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error when `path` is not a readable directory.
    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>>;

    /// Regular files below `root`, sorted, skipping hidden entries and
    /// anything deeper than `max_depth` directory levels.
    ///
    /// # Errors
    ///
    /// Returns an error when `root` cannot be listed.
    fn walk_files(&self, root: &Utf8Path, max_depth: usize) -> io::Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![(root.to_path_buf(), 0usize)];
        while let Some((dir, depth)) = pending.pop() {
            for child in self.list_dir(&dir)? {
                if is_hidden(&child) {
                    continue;
                }
                if self.is_dir(&child) {
                    if depth < max_depth {
                        pending.push((child, depth + 1));
                    }
                } else if self.is_file(&child) {
                    files.push(child);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_hidden(path: &Utf8Path) -> bool {
    path.file_name().is_some_and(|name| name.starts_with('.'))
}

fn non_utf8(path: &std::path::Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("non UTF-8 path {}", path.display()),
    )
}

/// The process's real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_text(&self, path: &Utf8Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Utf8Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
        let mut children = Vec::new();
        for entry in path.read_dir_utf8()? {
            children.push(entry?.path().to_path_buf());
        }
        children.sort();
        Ok(children)
    }

    fn walk_files(&self, root: &Utf8Path, max_depth: usize) -> io::Result<Vec<Utf8PathBuf>> {
        let walker = WalkDir::new(root)
            .max_depth(max_depth.saturating_add(1))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });
        let mut files = Vec::new();
        for item in walker {
            let entry = item.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::try_from(entry.into_path())
                .map_err(|err| non_utf8(err.as_path()))?;
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

/// A file tree held in memory.
///
/// Directories exist implicitly as ancestors of inserted files.
///
/// ```rust
/// use camino::{Utf8Path, Utf8PathBuf};
/// use gmake2cmake::fs::{FileSystem, MemoryFileSystem};
///
/// let fs = MemoryFileSystem::new()
///     .with_file("proj/Makefile", "all:\n")
///     .with_file("proj/src/a.c", "");
/// assert!(fs.is_dir(Utf8Path::new("proj/src")));
/// assert_eq!(
///     fs.walk_files(Utf8Path::new("proj"), 8).unwrap(),
///     vec![
///         Utf8PathBuf::from("proj/Makefile"),
///         Utf8PathBuf::from("proj/src/a.c"),
///     ],
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: BTreeMap<Utf8PathBuf, String>,
    dirs: BTreeSet<Utf8PathBuf>,
}

impl MemoryFileSystem {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file, creating its parent directories.
    pub fn insert(&mut self, path: impl Into<Utf8PathBuf>, contents: impl Into<String>) {
        let file: Utf8PathBuf = path.into();
        let mut parent = file.parent();
        while let Some(dir) = parent {
            if dir.as_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
        self.files.insert(file, contents.into());
    }

    /// Builder form of [`MemoryFileSystem::insert`].
    #[must_use]
    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_text(&self, path: &Utf8Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not found")))
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        self.files.contains_key(path)
    }

    fn is_dir(&self, path: &Utf8Path) -> bool {
        self.dirs.contains(path)
    }

    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
        if !self.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path} is not a directory"),
            ));
        }
        let children: BTreeSet<Utf8PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|candidate| candidate.parent() == Some(path))
            .cloned()
            .collect();
        Ok(children.into_iter().collect())
    }
}
