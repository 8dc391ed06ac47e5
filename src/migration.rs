//! Legacy-to-temporal schema migration.
//!
//! Schema 1 databases hold only flat entities. Migration lifts each flat
//! entity into a single temporal version anchored to a base epoch, then
//! bumps the document to schema 2. The flat records are kept for rebuilds
//! and older readers; only `rollback` removes temporal data.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::LoreDb;
use crate::entity::{EpochDraft, LegacyEntity, LoreDatabase, LORE_SCHEMA_VERSION};
use crate::error::{LoreError, Result};
use crate::temporal::{Resolver, VersionDraft};
use crate::timeline::Timeline;

/// Attribution recorded on versions this module creates.
const MIGRATION_AUTHOR: &str = "migration";

/// Year span of the base epoch created when the timeline is empty. Wide
/// enough to sit before and after any epoch a user will plausibly add.
const BASE_EPOCH_START: i64 = 0;
const BASE_EPOCH_END: i64 = 999_999;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub success: bool,
    pub message: String,
    pub migrated_entities: usize,
    /// One line per entity that could not be migrated; migration continues
    /// past individual failures.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub success: bool,
    pub issues: Vec<String>,
    pub legacy_entities: usize,
    pub temporal_entities: usize,
    pub versions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub status: String,
    pub schema_version: u32,
    pub legacy_entities: usize,
    pub temporal_entities: usize,
    pub epochs: usize,
    /// Version count per epoch id, including epochs with zero versions.
    pub versions_per_epoch: BTreeMap<String, usize>,
}

pub struct Migrator {
    db: Arc<LoreDb>,
    timeline: Arc<Timeline>,
    resolver: Arc<Resolver>,
}

impl Migrator {
    pub fn new(db: Arc<LoreDb>, timeline: Arc<Timeline>, resolver: Arc<Resolver>) -> Self {
        Self {
            db,
            timeline,
            resolver,
        }
    }

    /// A database needs migration exactly when it predates schema 2.
    /// Load-time normalization guarantees the temporal collections exist,
    /// so the version number is the whole check.
    pub fn is_migration_needed(&self) -> bool {
        self.db.load().version < LORE_SCHEMA_VERSION
    }

    /// Lift every flat entity into one temporal version under a base epoch.
    ///
    /// The base epoch is, in order of preference: the one named by
    /// `base_epoch_id` (unknown ids are an error), the earliest existing
    /// epoch, or a newly created epoch spanning effectively all time.
    ///
    /// Individual entity failures are collected rather than aborting the
    /// run; entities that already have a temporal counterpart are skipped,
    /// which makes re-running a partially failed migration safe.
    pub fn migrate(&self, base_epoch_id: Option<&str>) -> Result<MigrationOutcome> {
        if !self.is_migration_needed() {
            return Ok(MigrationOutcome {
                success: true,
                message: "database is already at the temporal schema".to_string(),
                migrated_entities: 0,
                failures: Vec::new(),
            });
        }

        let base_epoch = match base_epoch_id {
            Some(id) => self
                .timeline
                .find_epoch(id)
                .ok_or_else(|| LoreError::EpochNotFound(id.to_string()))?,
            None => match self.timeline.get_epochs().into_iter().next() {
                Some(earliest) => earliest,
                None => self.timeline.create_epoch(EpochDraft {
                    name: "Original Timeline".to_string(),
                    start_year: BASE_EPOCH_START,
                    end_year: BASE_EPOCH_END,
                    description: "Base epoch created during migration".to_string(),
                    ..Default::default()
                })?,
            },
        };

        let entities = self.db.load().entities;
        let mut migrated = 0;
        let mut failures = Vec::new();

        for entity in &entities {
            let key = entity.key();
            if key.is_empty() {
                failures.push("entity with no path or id skipped".to_string());
                continue;
            }
            if self.db.load().temporal(key).is_some() {
                continue;
            }

            let draft = VersionDraft {
                data: legacy_version_data(entity),
                created_by: Some(MIGRATION_AUTHOR.to_string()),
                based_on: None,
                entity_type: Some(entity.entity_type),
            };
            match self.resolver.upsert_entity_version(key, &base_epoch.id, draft) {
                Ok(_) => migrated += 1,
                Err(e) => {
                    warn!(entity = key, error = %e, "entity migration failed");
                    failures.push(format!("{}: {}", key, e));
                }
            }
        }

        let mut db = self.db.load();
        db.version = LORE_SCHEMA_VERSION;
        self.db.save(&mut db)?;

        info!(
            migrated,
            failed = failures.len(),
            epoch = %base_epoch.id,
            "legacy migration finished"
        );
        Ok(MigrationOutcome {
            success: failures.is_empty(),
            message: format!(
                "migrated {} entities into epoch '{}'",
                migrated, base_epoch.name
            ),
            migrated_entities: migrated,
            failures,
        })
    }

    /// Discard all temporal data and return to schema 1. Destructive: every
    /// version is lost, including ones recorded after migration. Flat
    /// entities and the timeline are untouched.
    pub fn rollback(&self) -> Result<LoreDatabase> {
        let mut db = self.db.load();
        db.temporal_entities.clear();
        db.version = LORE_SCHEMA_VERSION - 1;
        self.db.save(&mut db)?;
        Ok(db)
    }

    /// Structural checks over the migrated database. Read-only.
    pub fn validate(&self) -> ValidationReport {
        let db = self.db.load();
        let epochs = self.timeline.get_epochs();
        let mut issues = Vec::new();
        let mut versions = 0;

        for entity in &db.temporal_entities {
            if entity.entity_id.is_empty() {
                issues.push("temporal entity with empty entityId".to_string());
                continue;
            }
            for version in &entity.versions {
                versions += 1;
                if version.version_id.is_empty() {
                    issues.push(format!("{}: version with empty versionId", entity.entity_id));
                }
                if version.epoch_id.is_empty() {
                    issues.push(format!(
                        "{}/{}: version with empty epochId",
                        entity.entity_id, version.version_id
                    ));
                } else if !epochs.iter().any(|e| e.id == version.epoch_id) {
                    issues.push(format!(
                        "{}/{}: epoch {} does not exist",
                        entity.entity_id, version.version_id, version.epoch_id
                    ));
                }
                if let Some(parent) = &version.based_on {
                    if entity.find_version(parent).is_none() {
                        issues.push(format!(
                            "{}/{}: basedOn {} does not exist",
                            entity.entity_id, version.version_id, parent
                        ));
                    }
                }
            }
        }

        if db.version >= LORE_SCHEMA_VERSION {
            for entity in &db.entities {
                let key = entity.key();
                if !key.is_empty() && db.temporal(key).is_none() {
                    issues.push(format!("legacy entity {} has no temporal counterpart", key));
                }
            }
        }

        ValidationReport {
            success: issues.is_empty(),
            issues,
            legacy_entities: db.entities.len(),
            temporal_entities: db.temporal_entities.len(),
            versions,
        }
    }

    /// Counts and per-epoch version histogram for status displays. Read-only.
    pub fn report(&self) -> MigrationReport {
        let db = self.db.load();
        let epochs = self.timeline.get_epochs();

        let mut versions_per_epoch: BTreeMap<String, usize> =
            epochs.iter().map(|e| (e.id.clone(), 0)).collect();
        for entity in &db.temporal_entities {
            for version in &entity.versions {
                *versions_per_epoch.entry(version.epoch_id.clone()).or_insert(0) += 1;
            }
        }

        MigrationReport {
            status: if db.version < LORE_SCHEMA_VERSION {
                "pending".to_string()
            } else {
                "migrated".to_string()
            },
            schema_version: db.version,
            legacy_entities: db.entities.len(),
            temporal_entities: db.temporal_entities.len(),
            epochs: epochs.len(),
            versions_per_epoch,
        }
    }
}

/// Snapshot of a flat entity as a version payload. Empty collections are
/// omitted so migrated versions stay as small as hand-written ones.
fn legacy_version_data(entity: &LegacyEntity) -> Value {
    let mut data = serde_json::Map::new();
    data.insert("name".to_string(), json!(entity.title));
    if !entity.summary.is_empty() {
        data.insert("summary".to_string(), json!(entity.summary));
    }
    if !entity.facts.is_empty() {
        data.insert("facts".to_string(), json!(entity.facts));
    }
    if !entity.tags.is_empty() {
        data.insert("tags".to_string(), json!(entity.tags));
    }
    if !entity.links.is_empty() {
        data.insert("links".to_string(), json!(entity.links));
    }
    if !entity.path.is_empty() {
        data.insert("source".to_string(), json!(entity.path));
    }
    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LORE_DB_PATH;
    use crate::store::{DocumentStore, FsStore, ProjectLock};
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        db: Arc<LoreDb>,
        timeline: Arc<Timeline>,
        migrator: Migrator,
    }

    fn fixture(tmp: &TempDir) -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(FsStore::new(tmp.path()));
        let lock = Arc::new(ProjectLock::new());
        let db = Arc::new(LoreDb::new(store.clone(), lock.clone()));
        let timeline = Arc::new(Timeline::new(store.clone(), lock.clone()));
        let resolver = Arc::new(Resolver::new(db.clone(), timeline.clone(), lock));
        let migrator = Migrator::new(db.clone(), timeline.clone(), resolver);
        Fixture {
            store,
            db,
            timeline,
            migrator,
        }
    }

    const LEGACY_DOC: &str = r#"{
        "version": 1,
        "entities": [
            {"path": "keep.md", "title": "Old Keep", "type": "location",
             "summary": "A castle.", "facts": {"Garrison": "50"}},
            {"path": "maren.md", "title": "Maren", "type": "character",
             "tags": ["hero"]}
        ]
    }"#;

    fn seed_legacy(fx: &Fixture) {
        fx.store.write(LORE_DB_PATH, LEGACY_DOC).unwrap();
    }

    #[test]
    fn test_migration_needed_only_below_schema_2() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);

        // A fresh project starts at the current schema
        assert!(!fx.migrator.is_migration_needed());

        seed_legacy(&fx);
        assert!(fx.migrator.is_migration_needed());
    }

    #[test]
    fn test_versionless_document_needs_migration() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);

        // A document that predates the version field entirely
        fx.store
            .write(
                LORE_DB_PATH,
                r#"{"entities": [{"path": "keep.md", "title": "Old Keep", "type": "location"}]}"#,
            )
            .unwrap();

        assert!(fx.migrator.is_migration_needed());

        let outcome = fx.migrator.migrate(None).unwrap();
        assert_eq!(outcome.migrated_entities, 1);
        assert_eq!(fx.db.load().version, LORE_SCHEMA_VERSION);
        assert_eq!(fx.db.load().temporal("keep.md").unwrap().versions.len(), 1);
    }

    #[test]
    fn test_migrate_creates_base_epoch_when_timeline_empty() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        let outcome = fx.migrator.migrate(None).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.migrated_entities, 2);
        assert!(outcome.failures.is_empty());

        let epochs = fx.timeline.get_epochs();
        assert_eq!(epochs.len(), 1);
        assert_eq!(epochs[0].name, "Original Timeline");
        assert_eq!(epochs[0].start_year, 0);
        assert_eq!(epochs[0].end_year, 999_999);

        let db = fx.db.load();
        assert_eq!(db.version, LORE_SCHEMA_VERSION);
        assert_eq!(db.temporal_entities.len(), 2);
        // Flat entities are retained
        assert_eq!(db.entities.len(), 2);

        let keep = db.temporal("keep.md").unwrap();
        assert_eq!(keep.versions.len(), 1);
        assert_eq!(keep.versions[0].created_by.as_deref(), Some("migration"));
        assert_eq!(keep.versions[0].data["name"], "Old Keep");
        assert_eq!(keep.versions[0].data["facts"]["Garrison"], "50");
        // Empty collections omitted from the payload
        assert!(keep.versions[0].data.get("tags").is_none());
    }

    #[test]
    fn test_migrate_uses_earliest_existing_epoch() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        fx.timeline
            .create_epoch(EpochDraft {
                name: "Siege".to_string(),
                start_year: 500,
                end_year: 600,
                ..Default::default()
            })
            .unwrap();
        let founding = fx
            .timeline
            .create_epoch(EpochDraft {
                name: "Founding".to_string(),
                start_year: 0,
                end_year: 500,
                ..Default::default()
            })
            .unwrap();

        fx.migrator.migrate(None).unwrap();

        let db = fx.db.load();
        assert_eq!(db.temporal("keep.md").unwrap().versions[0].epoch_id, founding.id);
        // No extra epoch was created
        assert_eq!(fx.timeline.get_epochs().len(), 2);
    }

    #[test]
    fn test_migrate_explicit_base_epoch() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        let result = fx.migrator.migrate(Some("epoch_ghost"));
        assert!(matches!(result, Err(LoreError::EpochNotFound(_))));

        let siege = fx
            .timeline
            .create_epoch(EpochDraft {
                name: "Siege".to_string(),
                start_year: 500,
                end_year: 600,
                ..Default::default()
            })
            .unwrap();
        fx.migrator.migrate(Some(&siege.id)).unwrap();

        let db = fx.db.load();
        assert_eq!(db.temporal("maren.md").unwrap().versions[0].epoch_id, siege.id);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        let first = fx.migrator.migrate(None).unwrap();
        assert_eq!(first.migrated_entities, 2);

        let second = fx.migrator.migrate(None).unwrap();
        assert!(second.success);
        assert_eq!(second.migrated_entities, 0);

        let db = fx.db.load();
        assert_eq!(db.temporal_entities.len(), 2);
        assert_eq!(db.temporal("keep.md").unwrap().versions.len(), 1);
    }

    #[test]
    fn test_rollback_discards_temporal_data() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        fx.migrator.migrate(None).unwrap();
        let db = fx.migrator.rollback().unwrap();

        assert_eq!(db.version, 1);
        assert!(db.temporal_entities.is_empty());
        assert_eq!(db.entities.len(), 2);
        // Needed again after rollback
        assert!(fx.migrator.is_migration_needed());
    }

    #[test]
    fn test_validate_clean_after_migration() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);
        fx.migrator.migrate(None).unwrap();

        let report = fx.migrator.validate();
        assert!(report.success, "issues: {:?}", report.issues);
        assert_eq!(report.legacy_entities, 2);
        assert_eq!(report.temporal_entities, 2);
        assert_eq!(report.versions, 2);
    }

    #[test]
    fn test_validate_flags_structural_problems() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);

        // Hand-write a schema-2 document with a dangling basedOn, an unknown
        // epoch, and a legacy entity without a temporal counterpart.
        fx.store
            .write(
                LORE_DB_PATH,
                r#"{
                    "version": 2,
                    "entities": [{"path": "orphan.md", "title": "Orphan"}],
                    "temporalEntities": [{
                        "entityId": "keep.md",
                        "versions": [{
                            "versionId": "version_a",
                            "epochId": "epoch_ghost",
                            "data": {},
                            "createdAt": "2024-03-01T00:00:00Z",
                            "basedOn": "version_ghost"
                        }]
                    }]
                }"#,
            )
            .unwrap();

        let report = fx.migrator.validate();
        assert!(!report.success);
        assert_eq!(report.issues.len(), 3);
        assert!(report.issues.iter().any(|i| i.contains("epoch_ghost")));
        assert!(report.issues.iter().any(|i| i.contains("version_ghost")));
        assert!(report.issues.iter().any(|i| i.contains("orphan.md")));
    }

    #[test]
    fn test_report_histogram() {
        let tmp = TempDir::new().unwrap();
        let fx = fixture(&tmp);
        seed_legacy(&fx);

        let pending = fx.migrator.report();
        assert_eq!(pending.status, "pending");
        assert_eq!(pending.schema_version, 1);

        fx.migrator.migrate(None).unwrap();

        let report = fx.migrator.report();
        assert_eq!(report.status, "migrated");
        assert_eq!(report.epochs, 1);
        let epoch_id = &fx.timeline.get_epochs()[0].id;
        assert_eq!(report.versions_per_epoch.get(epoch_id), Some(&2));
    }
}
