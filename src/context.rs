//! Temporal context analysis.
//!
//! Read-only layer over resolved entity data: derives cross-entity
//! dependency edges from wiki-style `[[references]]` and embedded
//! `entityId` fields, and checks referential integrity within an epoch.
//! Performs no writes; everything here can be recomputed at any time.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::db::extract::extract_wiki_links;
use crate::db::LoreDb;
use crate::error::Result;
use crate::temporal::Resolver;
use crate::timeline::Timeline;

/// Display-oriented link between consecutive observations of an entity,
/// by creation-time order. A looser notion than `basedOn`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionLink {
    pub from_version: String,
    pub to_version: String,
}

/// States that a version is valid within its epoch's year span.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConstraint {
    pub version_id: String,
    pub epoch_id: String,
    pub start_year: i64,
    pub end_year: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    pub entity_id: String,
    pub dependencies: Vec<VersionLink>,
    pub constraints: Vec<VersionConstraint>,
}

/// Forward and reverse reference edges for one entity, computed from data
/// resolved at the active epoch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    pub entity_id: String,
    pub depends_on: Vec<String>,
    pub dependents: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    MissingDependency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub entity_id: String,
    pub dependency_id: String,
    pub epoch_id: String,
    pub description: String,
}

pub struct TemporalContext {
    db: Arc<LoreDb>,
    timeline: Arc<Timeline>,
    resolver: Arc<Resolver>,
}

impl TemporalContext {
    pub fn new(db: Arc<LoreDb>, timeline: Arc<Timeline>, resolver: Arc<Resolver>) -> Self {
        Self {
            db,
            timeline,
            resolver,
        }
    }

    /// Linear dependency chain and epoch-validity constraints for an
    /// entity's versions. `None` when the entity is not tracked.
    pub fn get_temporal_context(&self, entity_id: &str) -> Option<ContextReport> {
        let db = self.db.load();
        let entity = db.temporal(entity_id)?;
        let epochs = self.timeline.get_epochs();

        let mut versions = entity.versions.clone();
        versions.sort_by_key(|v| v.created_at);

        let dependencies = versions
            .windows(2)
            .map(|pair| VersionLink {
                from_version: pair[1].version_id.clone(),
                to_version: pair[0].version_id.clone(),
            })
            .collect();

        let constraints = versions
            .iter()
            .filter_map(|v| {
                let epoch = epochs.iter().find(|e| e.id == v.epoch_id)?;
                Some(VersionConstraint {
                    version_id: v.version_id.clone(),
                    epoch_id: epoch.id.clone(),
                    start_year: epoch.start_year,
                    end_year: epoch.end_year,
                })
            })
            .collect();

        Some(ContextReport {
            entity_id: entity_id.to_string(),
            dependencies,
            constraints,
        })
    }

    /// Reference edges for an entity at the active epoch. The reverse
    /// (`dependents`) index is computed by scanning every tracked entity's
    /// resolved data and inverting the edge.
    pub fn get_temporal_dependencies(&self, entity_id: &str) -> Result<DependencyGraph> {
        let depends_on = match self.resolver.get_entity_at_epoch(entity_id, None)? {
            Some(data) => references_in(&data, entity_id),
            None => Vec::new(),
        };

        let mut dependents = Vec::new();
        for other in self.db.load().temporal_entities {
            if other.entity_id == entity_id {
                continue;
            }
            if let Some(data) = self.resolver.get_entity_at_epoch(&other.entity_id, None)? {
                if references_in(&data, &other.entity_id)
                    .iter()
                    .any(|r| r.as_str() == entity_id)
                {
                    dependents.push(other.entity_id);
                }
            }
        }

        Ok(DependencyGraph {
            entity_id: entity_id.to_string(),
            depends_on,
            dependents,
        })
    }

    /// For every entity present in an epoch, flag referenced ids that do
    /// not themselves resolve to an entity in that same epoch.
    pub fn check_temporal_integrity(&self, epoch_id: &str) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();

        for entity in self.resolver.get_entities_at_epoch(epoch_id) {
            let Some(data) = self
                .resolver
                .get_entity_at_epoch(&entity.entity_id, Some(epoch_id))?
            else {
                continue;
            };

            for dependency_id in references_in(&data, &entity.entity_id) {
                if self
                    .resolver
                    .get_entity_at_epoch(&dependency_id, Some(epoch_id))?
                    .is_none()
                {
                    conflicts.push(Conflict {
                        kind: ConflictKind::MissingDependency,
                        entity_id: entity.entity_id.clone(),
                        dependency_id: dependency_id.clone(),
                        epoch_id: epoch_id.to_string(),
                        description: format!(
                            "{} references {} which does not resolve in this epoch",
                            entity.entity_id, dependency_id
                        ),
                    });
                }
            }
        }

        Ok(conflicts)
    }
}

/// Recursively scan resolved data for wiki-style references and nested
/// `entityId` fields. Self-references are dropped; order is first-seen,
/// deduped.
fn references_in(data: &Value, own_id: &str) -> Vec<String> {
    let mut refs = Vec::new();
    collect_refs(data, &mut refs);
    refs.retain(|r| r.as_str() != own_id);
    refs
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for target in extract_wiki_links(s) {
                push_unique(out, target);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("entityId") {
                push_unique(out, id.clone());
            }
            for nested in map.values() {
                collect_refs(nested, out);
            }
        }
        _ => {}
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !value.is_empty() && !out.contains(&value) {
        out.push(value);
    }
}
