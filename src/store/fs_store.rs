// src/store/fs_store.rs
//! Filesystem-backed document store rooted at a project directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::{normalize_path, ChildEntry, DocumentStore};

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`. The directory is created lazily on
    /// first write; a project may legitimately have no lore data yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize_path(path);
        let mut full = self.root.clone();
        for part in normalized.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }
}

impl DocumentStore for FsStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn read(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.resolve(path))?)
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }

    fn create_folder(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn list_children(&self, folder: &str) -> Result<Vec<ChildEntry>> {
        let full = self.resolve(folder);
        if !full.exists() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(full)? {
            let entry = entry?;
            children.push(ChildEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_folder: entry.file_type()?.is_dir(),
            });
        }

        // Stable ordering for deterministic scans
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}
