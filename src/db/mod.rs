//! Lore database service.
//!
//! Owns the on-disk `_lore/lore.json` document holding both entity models,
//! the derived Markdown index, and the legacy-model content extraction used
//! by full-corpus rebuilds. Version resolution lives in [`crate::temporal`];
//! this module is storage only.

pub mod extract;
pub mod index;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::entity::{LegacyEntity, LoreDatabase, LORE_SCHEMA_VERSION};
use crate::error::Result;
use crate::store::{DocumentStore, ProjectLock};

pub const LORE_DIR: &str = "_lore";
pub const LORE_DB_PATH: &str = "_lore/lore.json";
pub const INDEX_PATH: &str = "_lore/index.md";

/// Project-root note treated as the world-settings document; scalar
/// frontmatter fields and fact lines feed `globals.worldInfo`.
pub const WORLD_NOTE: &str = "world.md";

pub struct LoreDb {
    store: Arc<dyn DocumentStore>,
    lock: Arc<ProjectLock>,
}

impl LoreDb {
    pub fn new(store: Arc<dyn DocumentStore>, lock: Arc<ProjectLock>) -> Self {
        Self { store, lock }
    }

    /// Load the database. Never fails: a missing or unreadable document
    /// degrades to a fresh empty database, with the failure reported via
    /// `tracing` so corrupt files stay observable.
    pub fn load(&self) -> LoreDatabase {
        if !self.store.exists(LORE_DB_PATH) {
            return LoreDatabase::default();
        }

        let raw = match self.store.read(LORE_DB_PATH) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to read lore database, starting empty");
                return LoreDatabase::default();
            }
        };

        match serde_json::from_str::<LoreDatabase>(&raw) {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "lore database is not valid JSON, starting empty");
                LoreDatabase::default()
            }
        }
    }

    /// Save the database: stamps `updatedAt`, writes the JSON document, then
    /// regenerates the Markdown index wholesale. O(entities) per save, which
    /// is fine at project scale (hundreds of entities).
    pub fn save(&self, db: &mut LoreDatabase) -> Result<()> {
        let _guard = self.lock.acquire();
        self.persist(db)
    }

    /// Save without taking the project lock. For composite operations that
    /// already hold it.
    pub(crate) fn persist(&self, db: &mut LoreDatabase) -> Result<()> {
        db.updated_at = Utc::now();
        self.store.create_folder(LORE_DIR)?;
        self.store
            .write(LORE_DB_PATH, &serde_json::to_string_pretty(db)?)?;
        self.store.write(INDEX_PATH, &index::render_index(db))?;
        debug!(
            entities = db.entities.len(),
            temporal = db.temporal_entities.len(),
            "lore database saved"
        );
        Ok(())
    }

    /// Legacy-model upsert keyed by path-falling-back-to-id, last-write-wins.
    /// A record with neither key is a no-op that returns the database
    /// unchanged.
    pub fn upsert_entity(&self, mut entity: LegacyEntity) -> Result<LoreDatabase> {
        let _guard = self.lock.acquire();
        let mut db = self.load();

        if entity.key().is_empty() {
            return Ok(db);
        }

        entity.updated_at = Utc::now();
        match db.entities.iter_mut().find(|e| e.key() == entity.key()) {
            Some(existing) => *existing = entity,
            None => db.entities.push(entity),
        }

        self.persist(&mut db)?;
        Ok(db)
    }

    /// Full-corpus rescan: enumerate every Markdown document under the
    /// project root (excluding the lore folder itself) and re-derive each
    /// legacy entity from content.
    ///
    /// Produces a brand-new database, **discarding prior `temporalEntities`**.
    /// Callers that need to preserve versioned data must migrate it out
    /// first or not call this at all.
    pub fn rebuild(&self) -> Result<LoreDatabase> {
        let _guard = self.lock.acquire();

        let mut db = LoreDatabase {
            version: LORE_SCHEMA_VERSION,
            ..Default::default()
        };

        self.scan_folder("", &mut db.entities)?;
        db.globals.world_info = self.extract_world_info();

        self.persist(&mut db)?;
        Ok(db)
    }

    fn scan_folder(&self, folder: &str, out: &mut Vec<LegacyEntity>) -> Result<()> {
        for child in self.store.list_children(folder)? {
            let path = if folder.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", folder, child.name)
            };

            if child.is_folder {
                if path == LORE_DIR {
                    continue;
                }
                self.scan_folder(&path, out)?;
            } else if child.name.ends_with(".md") {
                match self.store.read(&path) {
                    Ok(content) => out.push(derive_entity(&path, &child.name, &content)),
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping unreadable note during rebuild");
                    }
                }
            }
        }
        Ok(())
    }

    fn extract_world_info(&self) -> std::collections::BTreeMap<String, String> {
        let mut info = std::collections::BTreeMap::new();
        if !self.store.exists(WORLD_NOTE) {
            return info;
        }
        let Ok(content) = self.store.read(WORLD_NOTE) else {
            return info;
        };

        let (fm, body) = extract::split_frontmatter(&content);
        if let Some(fm) = &fm {
            for (key, value) in fm {
                if matches!(key.as_str(), "title" | "type" | "tags") {
                    continue;
                }
                if let Some(s) = value.as_str() {
                    info.insert(key.clone(), s.to_string());
                }
            }
        }
        for (key, value) in extract::extract_facts(body) {
            info.insert(key.to_lowercase(), value);
        }
        info
    }
}

/// Derive a legacy entity from one note's content.
fn derive_entity(path: &str, file_name: &str, content: &str) -> LegacyEntity {
    let (fm, body) = extract::split_frontmatter(content);
    let fm = fm.as_ref();

    LegacyEntity {
        id: path.to_string(),
        path: path.to_string(),
        title: extract::extract_title(fm, body, file_name),
        entity_type: extract::detect_entity_type(fm, body),
        tags: extract::extract_tags(fm, body),
        summary: extract::extract_summary(body),
        facts: extract::extract_facts(body),
        relations: Vec::new(),
        links: extract::extract_wiki_links(body),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, EntityVersion, TemporalEntity};
    use crate::store::FsStore;
    use tempfile::TempDir;

    fn lore_db(tmp: &TempDir) -> LoreDb {
        LoreDb::new(
            Arc::new(FsStore::new(tmp.path())),
            Arc::new(ProjectLock::new()),
        )
    }

    #[test]
    fn test_load_missing_is_empty_default() {
        let tmp = TempDir::new().unwrap();
        let db = lore_db(&tmp).load();

        assert_eq!(db.version, LORE_SCHEMA_VERSION);
        assert!(db.entities.is_empty());
        assert!(db.temporal_entities.is_empty());
    }

    #[test]
    fn test_load_corrupt_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);
        std::fs::create_dir_all(tmp.path().join("_lore")).unwrap();
        std::fs::write(tmp.path().join("_lore/lore.json"), "{not json").unwrap();

        let db = service.load();
        assert!(db.entities.is_empty());
    }

    #[test]
    fn test_save_roundtrip_and_index_side_effect() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);

        let mut db = LoreDatabase::default();
        db.entities.push(LegacyEntity {
            path: "keep.md".to_string(),
            title: "Old Keep".to_string(),
            entity_type: EntityType::Location,
            ..Default::default()
        });
        db.temporal_entities.push(TemporalEntity {
            entity_id: "keep.md".to_string(),
            entity_type: EntityType::Location,
            versions: vec![EntityVersion {
                version_id: "version_1".to_string(),
                epoch_id: "epoch_1".to_string(),
                data: serde_json::json!({"garrison": 50}),
                created_at: Utc::now(),
                created_by: None,
                based_on: None,
            }],
        });
        service.save(&mut db).unwrap();

        let reloaded = service.load();
        assert_eq!(reloaded.entities.len(), 1);
        assert_eq!(reloaded.entities[0].title, "Old Keep");
        assert_eq!(reloaded.temporal_entities.len(), 1);
        assert_eq!(
            reloaded.temporal_entities[0].versions[0].data,
            serde_json::json!({"garrison": 50})
        );

        // Index regenerated alongside
        let index = std::fs::read_to_string(tmp.path().join("_lore/index.md")).unwrap();
        assert!(index.contains("Old Keep"));
    }

    #[test]
    fn test_upsert_entity_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);

        service
            .upsert_entity(LegacyEntity {
                path: "keep.md".to_string(),
                title: "Old Keep".to_string(),
                ..Default::default()
            })
            .unwrap();
        let db = service
            .upsert_entity(LegacyEntity {
                path: "keep.md".to_string(),
                title: "New Keep".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(db.entities.len(), 1);
        assert_eq!(db.entities[0].title, "New Keep");
    }

    #[test]
    fn test_upsert_entity_without_key_is_noop() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);

        let db = service.upsert_entity(LegacyEntity::default()).unwrap();
        assert!(db.entities.is_empty());
        // Nothing was written either
        assert!(!tmp.path().join("_lore/lore.json").exists());
    }

    #[test]
    fn test_rebuild_scans_notes_and_skips_lore_folder() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);
        let store = FsStore::new(tmp.path());

        store
            .write(
                "locations/keep.md",
                "---\ntype: location\n---\n# Old Keep\n\nA castle. [[Maren]]\n\n**Garrison:** 50\n",
            )
            .unwrap();
        store
            .write("maren.md", "# Maren\n\nA wandering character. #hero\n")
            .unwrap();
        // Anything under _lore must not be scanned back in
        store.write("_lore/index.md", "# Lore Index").unwrap();

        let db = service.rebuild().unwrap();
        assert_eq!(db.entities.len(), 2);

        let keep = db.entities.iter().find(|e| e.path == "locations/keep.md").unwrap();
        assert_eq!(keep.title, "Old Keep");
        assert_eq!(keep.entity_type, EntityType::Location);
        assert_eq!(keep.links, vec!["Maren"]);
        assert_eq!(keep.facts.get("Garrison").unwrap(), "50");

        let maren = db.entities.iter().find(|e| e.path == "maren.md").unwrap();
        assert_eq!(maren.entity_type, EntityType::Character);
        assert_eq!(maren.tags, vec!["hero"]);
    }

    #[test]
    fn test_rebuild_discards_temporal_entities() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);

        let mut db = LoreDatabase::default();
        db.temporal_entities.push(TemporalEntity {
            entity_id: "keep.md".to_string(),
            ..Default::default()
        });
        service.save(&mut db).unwrap();

        let rebuilt = service.rebuild().unwrap();
        assert!(rebuilt.temporal_entities.is_empty());
    }

    #[test]
    fn test_rebuild_extracts_world_info() {
        let tmp = TempDir::new().unwrap();
        let service = lore_db(&tmp);
        let store = FsStore::new(tmp.path());

        store
            .write(
                "world.md",
                "---\nname: Veldenmark\nera: Third Age\n---\n# Veldenmark\n\n**Magic:** rare\n",
            )
            .unwrap();

        let db = service.rebuild().unwrap();
        assert_eq!(db.globals.world_info.get("name").unwrap(), "Veldenmark");
        assert_eq!(db.globals.world_info.get("era").unwrap(), "Third Age");
        assert_eq!(db.globals.world_info.get("magic").unwrap(), "rare");
    }
}
