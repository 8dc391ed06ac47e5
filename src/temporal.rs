//! Temporal entity resolver, the core versioning algorithm.
//!
//! Answers "what does entity E look like at epoch T" by finding the
//! version tagged with T (or, failing that, the nearest strictly-earlier
//! epoch that has one; a version persists forward in time until
//! superseded) and deep-merging its `basedOn` inheritance chain.
//!
//! Note the deliberate asymmetry: [`Resolver::get_entity_at_epoch`] applies
//! the backward fallback ("entity state as of this epoch"), while
//! [`Resolver::get_entities_at_epoch`] matches epoch tags exactly ("what
//! changed in this epoch") and never falls back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::db::LoreDb;
use crate::entity::{new_version_id, EntityType, EntityVersion, TemporalEntity};
use crate::error::{LoreError, Result};
use crate::store::ProjectLock;
use crate::timeline::Timeline;

/// Caller-supplied fields for recording a new version.
#[derive(Debug, Default)]
pub struct VersionDraft {
    /// Entity payload; shape is owned by the caller. Only *changed* fields
    /// need to be present when `based_on` points at an ancestor.
    pub data: Value,
    pub created_by: Option<String>,
    /// Explicit inheritance target. When absent, same-epoch edits chain to
    /// the most recently created version in the same epoch; a new epoch's
    /// first version inherits nothing.
    pub based_on: Option<String>,
    /// Sets the container's type on create (and updates it on upsert).
    pub entity_type: Option<EntityType>,
}

pub struct Resolver {
    db: Arc<LoreDb>,
    timeline: Arc<Timeline>,
    lock: Arc<ProjectLock>,
}

impl Resolver {
    pub fn new(db: Arc<LoreDb>, timeline: Arc<Timeline>, lock: Arc<ProjectLock>) -> Self {
        Self { db, timeline, lock }
    }

    /// Resolve an entity's effective data as of an epoch.
    ///
    /// With `epoch_id` omitted the project's active epoch is used; no active
    /// epoch means no answer. Returns `Ok(None)` for "nothing recorded";
    /// errors are reserved for structural problems in the stored chain
    /// (cycles, dangling `basedOn`).
    pub fn get_entity_at_epoch(
        &self,
        entity_id: &str,
        epoch_id: Option<&str>,
    ) -> Result<Option<Value>> {
        let epoch_id = match epoch_id {
            Some(id) => id.to_string(),
            None => match self.timeline.get_active_epoch() {
                Some(epoch) => epoch.id,
                None => return Ok(None),
            },
        };

        let db = self.db.load();
        let Some(entity) = db.temporal(entity_id) else {
            return Ok(None);
        };

        if let Some(version) = entity.latest_version_in_epoch(&epoch_id) {
            return resolve_version_data(entity, version).map(Some);
        }

        // Fallback: nearest strictly-earlier epoch with a version.
        let epochs = self.timeline.get_epochs();
        let Some(pos) = epochs.iter().position(|e| e.id == epoch_id) else {
            return Ok(None);
        };
        for earlier in epochs[..pos].iter().rev() {
            if let Some(version) = entity.latest_version_in_epoch(&earlier.id) {
                return resolve_version_data(entity, version).map(Some);
            }
        }

        Ok(None)
    }

    /// Record a new version of an entity within an epoch.
    ///
    /// The epoch must exist. The entity container is created on first use.
    pub fn upsert_entity_version(
        &self,
        entity_id: &str,
        epoch_id: &str,
        draft: VersionDraft,
    ) -> Result<TemporalEntity> {
        if self.timeline.find_epoch(epoch_id).is_none() {
            return Err(LoreError::EpochNotFound(epoch_id.to_string()));
        }

        let _guard = self.lock.acquire();
        let mut db = self.db.load();

        let idx = match db
            .temporal_entities
            .iter()
            .position(|e| e.entity_id == entity_id)
        {
            Some(idx) => {
                if let Some(entity_type) = draft.entity_type {
                    db.temporal_entities[idx].entity_type = entity_type;
                }
                idx
            }
            None => {
                db.temporal_entities.push(TemporalEntity {
                    entity_id: entity_id.to_string(),
                    entity_type: draft.entity_type.unwrap_or_default(),
                    versions: Vec::new(),
                });
                db.temporal_entities.len() - 1
            }
        };

        let entity = &mut db.temporal_entities[idx];
        let based_on = match draft.based_on {
            Some(parent_id) => {
                if entity.find_version(&parent_id).is_none() {
                    return Err(LoreError::VersionNotFound(parent_id));
                }
                Some(parent_id)
            }
            None => entity
                .latest_version_in_epoch(epoch_id)
                .map(|v| v.version_id.clone()),
        };

        entity.versions.push(EntityVersion {
            version_id: new_version_id(),
            epoch_id: epoch_id.to_string(),
            data: draft.data,
            created_at: Utc::now(),
            created_by: draft.created_by,
            based_on,
        });

        let result = db.temporal_entities[idx].clone();
        self.db.persist(&mut db)?;
        Ok(result)
    }

    /// Raw, unresolved version list. Callers needing merged data must
    /// resolve explicitly.
    pub fn get_entity_versions(&self, entity_id: &str) -> Vec<EntityVersion> {
        self.db
            .load()
            .temporal(entity_id)
            .map(|e| e.versions.clone())
            .unwrap_or_default()
    }

    /// Every entity with at least one version tagged *exactly* with this
    /// epoch. No backward fallback; see the module docs.
    pub fn get_entities_at_epoch(&self, epoch_id: &str) -> Vec<TemporalEntity> {
        self.db
            .load()
            .temporal_entities
            .iter()
            .filter(|e| e.versions.iter().any(|v| v.epoch_id == epoch_id))
            .cloned()
            .collect()
    }

    /// Delete one version. Refused when any other version's `basedOn`
    /// points at it, so inheritance chains never dangle.
    pub fn delete_entity_version(&self, entity_id: &str, version_id: &str) -> Result<()> {
        let _guard = self.lock.acquire();
        let mut db = self.db.load();

        let Some(entity) = db.temporal_mut(entity_id) else {
            return Err(LoreError::EntityNotFound(entity_id.to_string()));
        };
        if entity.find_version(version_id).is_none() {
            return Err(LoreError::VersionNotFound(version_id.to_string()));
        }
        if let Some(dependent) = entity
            .versions
            .iter()
            .find(|v| v.based_on.as_deref() == Some(version_id))
        {
            return Err(LoreError::VersionReferenced {
                version_id: version_id.to_string(),
                dependent_id: dependent.version_id.clone(),
            });
        }

        entity.versions.retain(|v| v.version_id != version_id);
        self.db.persist(&mut db)
    }
}

/// Resolve a version's effective data: its `data` deep-merged over the
/// recursively resolved `basedOn` chain. Child keys win; nested objects
/// merge recursively; arrays and scalars are replaced wholesale.
pub fn resolve_version_data(entity: &TemporalEntity, version: &EntityVersion) -> Result<Value> {
    let mut visited = HashSet::new();
    resolve_recursive(entity, version, &mut visited)
}

fn resolve_recursive(
    entity: &TemporalEntity,
    version: &EntityVersion,
    visited: &mut HashSet<String>,
) -> Result<Value> {
    if !visited.insert(version.version_id.clone()) {
        return Err(LoreError::CyclicInheritance(version.version_id.clone()));
    }

    let mut resolved = match &version.based_on {
        Some(parent_id) => {
            let parent = entity
                .find_version(parent_id)
                .ok_or_else(|| LoreError::VersionNotFound(parent_id.clone()))?;
            resolve_recursive(entity, parent, visited)?
        }
        None => Value::Object(serde_json::Map::new()),
    };

    deep_merge(&mut resolved, &version.data);
    Ok(resolved)
}

fn deep_merge(base: &mut Value, patch: &Value) {
    match (&mut *base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(slot) if slot.is_object() && value.is_object() => {
                        deep_merge(slot, value);
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        _ => *base = patch.clone(),
    }
}
