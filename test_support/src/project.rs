//! Temporary makefile project fixtures.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Write `files` (relative path, contents) below `root`, creating
/// directories as needed.
///
/// # Errors
///
/// Returns an error when a directory or file cannot be created.
pub fn write_tree(root: &Utf8Path, files: &[(&str, &str)]) -> Result<()> {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {path}"))?;
    }
    Ok(())
}

/// A project tree that lives as long as the value.
#[derive(Debug)]
pub struct MakeProject {
    dir: TempDir,
    root: Utf8PathBuf,
}

impl MakeProject {
    /// Create a project containing `files`.
    ///
    /// # Errors
    ///
    /// Returns an error when the temporary directory or a file cannot be
    /// created, or when the temporary path is not UTF-8.
    pub fn new(files: &[(&str, &str)]) -> Result<Self> {
        let dir = TempDir::new().context("create temp dir")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non UTF-8 temp dir {}", path.display()))?;
        write_tree(&root, files)?;
        Ok(Self { dir, root })
    }

    /// Root directory of the project.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Add more files after creation.
    ///
    /// # Errors
    ///
    /// See [`write_tree`].
    pub fn write(&self, files: &[(&str, &str)]) -> Result<()> {
        write_tree(&self.root, files)
    }

    /// Parse a JSON file below the root.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not JSON.
    pub fn read_json(&self, relative: &str) -> Result<serde_json::Value> {
        let path = self.root.join(relative);
        let text = fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
        serde_json::from_str(&text).with_context(|| format!("parse {path}"))
    }

    /// The underlying temporary directory.
    #[must_use]
    pub const fn temp_dir(&self) -> &TempDir {
        &self.dir
    }
}
