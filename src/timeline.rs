//! Timeline service: CRUD over a project's epochs.
//!
//! Epochs live in `_lore/timeline.json` as one ordered JSON array. At most
//! one epoch is active at a time; it is the default resolution target for
//! "what does this entity look like now".

use std::sync::Arc;

use tracing::warn;

use crate::db::LORE_DIR;
use crate::entity::{new_epoch_id, Epoch, EpochDraft};
use crate::error::{LoreError, Result};
use crate::store::{DocumentStore, ProjectLock};

pub const TIMELINE_PATH: &str = "_lore/timeline.json";
pub const CONTEXTS_PATH: &str = "_lore/temporal_contexts.json";

/// Write attempts before a timeline save is surfaced as a failure. The
/// canonical path is never forked to a fallback file.
const SAVE_ATTEMPTS: u32 = 3;

pub struct Timeline {
    store: Arc<dyn DocumentStore>,
    lock: Arc<ProjectLock>,
}

impl Timeline {
    pub fn new(store: Arc<dyn DocumentStore>, lock: Arc<ProjectLock>) -> Self {
        Self { store, lock }
    }

    /// All epochs, ordered by `start_year`. Missing or unreadable timeline
    /// documents degrade to an empty list.
    pub fn get_epochs(&self) -> Vec<Epoch> {
        let mut epochs = self.read_document::<Vec<Epoch>>(TIMELINE_PATH);
        epochs.sort_by_key(|e| e.start_year);
        epochs
    }

    pub fn find_epoch(&self, id: &str) -> Option<Epoch> {
        self.get_epochs().into_iter().find(|e| e.id == id)
    }

    /// Overwrite the timeline document.
    pub fn save_epochs(&self, epochs: &[Epoch]) -> Result<()> {
        let _guard = self.lock.acquire();
        self.persist_epochs(epochs)
    }

    /// Bounded retry against the single canonical path; after exhaustion the
    /// error is surfaced rather than forking the timeline.
    pub(crate) fn persist_epochs(&self, epochs: &[Epoch]) -> Result<()> {
        self.store.create_folder(LORE_DIR)?;
        let json = serde_json::to_string_pretty(epochs)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.write(TIMELINE_PATH, &json) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    warn!(attempt, error = %e, "timeline save failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create a new epoch. Generated id, `active = false`.
    pub fn create_epoch(&self, draft: EpochDraft) -> Result<Epoch> {
        let _guard = self.lock.acquire();
        let mut epochs = self.get_epochs();

        let epoch = Epoch::from_draft(new_epoch_id(), draft);
        epochs.push(epoch.clone());
        self.persist_epochs(&epochs)?;
        Ok(epoch)
    }

    /// Apply `draft` to the epoch with `id`, appending a new epoch under
    /// that id when none exists (find-or-append semantics). Stamps `updated`.
    pub fn update_epoch(&self, id: &str, draft: EpochDraft) -> Result<Epoch> {
        let _guard = self.lock.acquire();
        let mut epochs = self.get_epochs();

        let epoch = match epochs.iter_mut().find(|e| e.id == id) {
            Some(existing) => {
                existing.apply(draft);
                existing.clone()
            }
            None => {
                let created = Epoch::from_draft(id.to_string(), draft);
                epochs.push(created.clone());
                created
            }
        };

        self.persist_epochs(&epochs)?;
        Ok(epoch)
    }

    /// Replace the stored epoch with the same id, or append. Stamps `updated`.
    pub fn save_epoch(&self, mut epoch: Epoch) -> Result<Epoch> {
        let _guard = self.lock.acquire();
        let mut epochs = self.get_epochs();

        epoch.updated = chrono::Utc::now();
        match epochs.iter_mut().find(|e| e.id == epoch.id) {
            Some(existing) => *existing = epoch.clone(),
            None => epochs.push(epoch.clone()),
        }

        self.persist_epochs(&epochs)?;
        Ok(epoch)
    }

    /// The single epoch flagged active, if any.
    pub fn get_active_epoch(&self) -> Option<Epoch> {
        self.get_epochs().into_iter().find(|e| e.active)
    }

    /// Make `id` the active epoch as one transform-then-save.
    ///
    /// On an unknown id the flags are still cleared and saved before the
    /// error is returned: the project ends with no active epoch rather than
    /// a stale one.
    pub fn set_active_epoch(&self, id: &str) -> Result<Epoch> {
        let _guard = self.lock.acquire();
        let mut epochs = self.get_epochs();

        for epoch in epochs.iter_mut() {
            epoch.active = false;
        }

        match epochs.iter_mut().find(|e| e.id == id) {
            Some(target) => {
                target.active = true;
                target.updated = chrono::Utc::now();
                let activated = target.clone();
                self.persist_epochs(&epochs)?;
                Ok(activated)
            }
            None => {
                self.persist_epochs(&epochs)?;
                Err(LoreError::EpochNotFound(id.to_string()))
            }
        }
    }

    // ========== Temporal context sidecar ==========

    /// Persist the ad-hoc temporal context records. An independently keyed
    /// document; not cross-validated against the timeline or lore database.
    pub fn save_temporal_contexts(&self, contexts: &[serde_json::Value]) -> Result<()> {
        let _guard = self.lock.acquire();
        self.store.create_folder(LORE_DIR)?;
        self.store
            .write(CONTEXTS_PATH, &serde_json::to_string_pretty(contexts)?)?;
        Ok(())
    }

    pub fn get_temporal_contexts(&self) -> Vec<serde_json::Value> {
        self.read_document(CONTEXTS_PATH)
    }

    fn read_document<T: serde::de::DeserializeOwned + Default>(&self, path: &str) -> T {
        if !self.store.exists(path) {
            return T::default();
        }
        let raw = match self.store.read(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path, error = %e, "failed to read timeline document, using default");
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(path, error = %e, "timeline document is not valid JSON, using default");
                T::default()
            }
        }
    }
}
