//! Document store seam.
//!
//! The host note-taking application owns file storage; the lore database
//! only ever sees an abstract path-addressed document store. Paths are
//! project-root-relative and use `/` separators.

mod fs_store;

pub use fs_store::FsStore;

use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// A child of a folder, as reported by [`DocumentStore::list_children`].
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: String,
    pub is_folder: bool,
}

/// Abstract persistent store addressed by project-relative path.
///
/// `write` is create-or-overwrite. Implementations must accept paths with
/// either separator; callers should still prefer [`normalize_path`]ed input.
pub trait DocumentStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Result<String>;
    fn write(&self, path: &str, content: &str) -> Result<()>;
    fn create_folder(&self, path: &str) -> Result<()>;
    fn list_children(&self, folder: &str) -> Result<Vec<ChildEntry>>;
}

/// Canonicalize a store path: `/` separators, no leading `./` or `/`,
/// no duplicate separators.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_sep = true; // start true to trim a leading separator

    for c in path.chars() {
        if c == '/' || c == '\\' {
            if !last_was_sep {
                out.push('/');
                last_was_sep = true;
            }
        } else {
            out.push(c);
            last_was_sep = false;
        }
    }

    if out.ends_with('/') {
        out.pop();
    }
    if let Some(rest) = out.strip_prefix("./") {
        return rest.to_string();
    }
    out
}

/// Serializes read-modify-write cycles against one project's documents.
///
/// The lore database and the timeline are whole-document JSON files; without
/// this, two in-process writers can both load the same prior state and the
/// second save silently drops the first. One lock per project, shared by
/// every service bound to that project. No cross-process safety is attempted.
#[derive(Debug, Default)]
pub struct ProjectLock {
    inner: Mutex<()>,
}

impl ProjectLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the project guard. Poisoning is ignored: the protected state
    /// lives on disk, not in the mutex.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
