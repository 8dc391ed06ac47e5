//! Temporal lore database for worldbuilding projects.
//!
//! Tracks versioned entities across narrative-time epochs: an entity's
//! state is recorded as versions tagged to epochs, versions inherit from
//! each other via `basedOn` deep-merging, and resolution answers "what did
//! this entity look like during epoch T". Everything persists as JSON
//! documents under the project's `_lore/` folder, plus a derived Markdown
//! index.

pub mod context;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod store;
pub mod temporal;
pub mod timeline;

pub use context::TemporalContext;
pub use db::LoreDb;
pub use error::{LoreError, Result};
pub use migration::Migrator;
pub use store::{DocumentStore, FsStore, ProjectLock};
pub use temporal::Resolver;
pub use timeline::Timeline;

use std::sync::Arc;

/// All services wired against one document store, sharing the project
/// lock that serializes read-modify-write cycles.
pub struct LoreServices {
    pub db: Arc<LoreDb>,
    pub timeline: Arc<Timeline>,
    pub resolver: Arc<Resolver>,
    pub context: Arc<TemporalContext>,
    pub migrator: Arc<Migrator>,
}

impl LoreServices {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let lock = Arc::new(ProjectLock::new());
        let db = Arc::new(LoreDb::new(store.clone(), lock.clone()));
        let timeline = Arc::new(Timeline::new(store, lock.clone()));
        let resolver = Arc::new(Resolver::new(db.clone(), timeline.clone(), lock));
        let context = Arc::new(TemporalContext::new(
            db.clone(),
            timeline.clone(),
            resolver.clone(),
        ));
        let migrator = Arc::new(Migrator::new(
            db.clone(),
            timeline.clone(),
            resolver.clone(),
        ));
        Self {
            db,
            timeline,
            resolver,
            context,
            migrator,
        }
    }

    /// Convenience constructor for a project rooted on the local filesystem.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FsStore::new(root)))
    }
}
