mod epoch;

pub use epoch::{Epoch, EpochDraft};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version of the persisted lore database.
/// 1 = legacy flat entities only, 2 = temporal entities supported.
pub const LORE_SCHEMA_VERSION: u32 = 2;

/// Kind of thing an entity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Character,
    Location,
    Artifact,
    Potion,
    Event,
    Organization,
    #[default]
    Unknown,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Character => write!(f, "character"),
            EntityType::Location => write!(f, "location"),
            EntityType::Artifact => write!(f, "artifact"),
            EntityType::Potion => write!(f, "potion"),
            EntityType::Event => write!(f, "event"),
            EntityType::Organization => write!(f, "organization"),
            EntityType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "character" => Ok(EntityType::Character),
            "location" | "place" => Ok(EntityType::Location),
            "artifact" | "item" => Ok(EntityType::Artifact),
            "potion" => Ok(EntityType::Potion),
            "event" => Ok(EntityType::Event),
            "organization" | "faction" => Ok(EntityType::Organization),
            "unknown" => Ok(EntityType::Unknown),
            _ => Err(format!("Unknown entity type: {}", s)),
        }
    }
}

impl EntityType {
    /// Plural heading used when grouping entities in the derived index.
    pub fn plural_label(&self) -> &'static str {
        match self {
            EntityType::Character => "Characters",
            EntityType::Location => "Locations",
            EntityType::Artifact => "Artifacts",
            EntityType::Potion => "Potions",
            EntityType::Event => "Events",
            EntityType::Organization => "Organizations",
            EntityType::Unknown => "Other",
        }
    }

    pub const ALL: [EntityType; 7] = [
        EntityType::Character,
        EntityType::Location,
        EntityType::Artifact,
        EntityType::Potion,
        EntityType::Event,
        EntityType::Organization,
        EntityType::Unknown,
    ];
}

/// Flat, non-versioned entity record. Retained for backward compatibility
/// and full-corpus rebuilds; identity is `path`, falling back to `id`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyEntity {
    pub id: String,
    pub path: String,
    pub title: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub tags: Vec<String>,
    pub summary: String,
    pub facts: BTreeMap<String, String>,
    /// Unused placeholder kept for wire compatibility with older documents.
    pub relations: Vec<serde_json::Value>,
    pub links: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl LegacyEntity {
    /// Upsert key: `path` when present, else `id`. Empty when neither is set.
    pub fn key(&self) -> &str {
        if !self.path.is_empty() {
            &self.path
        } else {
            &self.id
        }
    }
}

/// One recorded observation of an entity's data, tagged to an epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityVersion {
    pub version_id: String,
    pub epoch_id: String,
    /// Arbitrary payload, shape owned by the caller. Resolution deep-merges
    /// this over the recursively resolved `based_on` chain.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
}

/// A named thing tracked across epochs via a sequence of versions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TemporalEntity {
    pub entity_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub versions: Vec<EntityVersion>,
}

impl TemporalEntity {
    pub fn find_version(&self, version_id: &str) -> Option<&EntityVersion> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }

    /// Most recently created version tagged exactly with `epoch_id`.
    /// Same-epoch edits chain via `based_on`, so the newest one is the
    /// effective state; append order breaks creation-time ties.
    pub fn latest_version_in_epoch(&self, epoch_id: &str) -> Option<&EntityVersion> {
        let mut best: Option<&EntityVersion> = None;
        for version in self.versions.iter().filter(|v| v.epoch_id == epoch_id) {
            match best {
                Some(b) if version.created_at < b.created_at => {}
                _ => best = Some(version),
            }
        }
        best
    }
}

/// Free-form world metadata. Advisory only, no invariants.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Globals {
    pub world_info: BTreeMap<String, String>,
}

/// The persisted lore database document (`_lore/lore.json`).
///
/// Every field carries a serde default so documents written by older schema
/// versions normalize on load instead of failing. A stored document with no
/// `version` field predates versioning entirely and deserializes as schema 1,
/// while [`LoreDatabase::default`] starts fresh databases at the current
/// schema; the two defaults are deliberately different.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoreDatabase {
    #[serde(default = "pre_versioning_schema")]
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub globals: Globals,
    pub entities: Vec<LegacyEntity>,
    pub temporal_entities: Vec<TemporalEntity>,
}

fn pre_versioning_schema() -> u32 {
    1
}

impl Default for LoreDatabase {
    fn default() -> Self {
        Self {
            version: LORE_SCHEMA_VERSION,
            updated_at: Utc::now(),
            globals: Globals::default(),
            entities: Vec::new(),
            temporal_entities: Vec::new(),
        }
    }
}

impl LoreDatabase {
    pub fn temporal(&self, entity_id: &str) -> Option<&TemporalEntity> {
        self.temporal_entities
            .iter()
            .find(|e| e.entity_id == entity_id)
    }

    pub fn temporal_mut(&mut self, entity_id: &str) -> Option<&mut TemporalEntity> {
        self.temporal_entities
            .iter_mut()
            .find(|e| e.entity_id == entity_id)
    }
}

pub fn new_epoch_id() -> String {
    format!("epoch_{}", Uuid::new_v4().simple())
}

pub fn new_version_id() -> String {
    format!("version_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for t in EntityType::ALL {
            let parsed: EntityType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_entity_type_aliases() {
        assert_eq!("faction".parse::<EntityType>().unwrap(), EntityType::Organization);
        assert_eq!("place".parse::<EntityType>().unwrap(), EntityType::Location);
        assert!("dragonkind".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_legacy_entity_key_prefers_path() {
        let mut entity = LegacyEntity::default();
        assert_eq!(entity.key(), "");

        entity.id = "castle_1".to_string();
        assert_eq!(entity.key(), "castle_1");

        entity.path = "locations/castle.md".to_string();
        assert_eq!(entity.key(), "locations/castle.md");
    }

    #[test]
    fn test_lore_database_tolerates_legacy_document() {
        // A schema-1 document: no temporalEntities, no globals.
        let raw = r#"{"version":1,"updatedAt":"2024-03-01T00:00:00Z","entities":[{"path":"a.md","title":"A","type":"character"}]}"#;
        let db: LoreDatabase = serde_json::from_str(raw).unwrap();

        assert_eq!(db.version, 1);
        assert_eq!(db.entities.len(), 1);
        assert_eq!(db.entities[0].entity_type, EntityType::Character);
        assert!(db.temporal_entities.is_empty());
        assert!(db.globals.world_info.is_empty());
    }

    #[test]
    fn test_versionless_document_deserializes_as_schema_1() {
        // Documents older than the version field itself are schema 1, even
        // though fresh databases default to the current schema.
        let raw = r#"{"entities":[{"path":"a.md","title":"A"}]}"#;
        let db: LoreDatabase = serde_json::from_str(raw).unwrap();

        assert_eq!(db.version, 1);
        assert_eq!(db.entities.len(), 1);
        assert_eq!(LoreDatabase::default().version, LORE_SCHEMA_VERSION);
    }

    #[test]
    fn test_version_serializes_camel_case() {
        let version = EntityVersion {
            version_id: "version_abc".to_string(),
            epoch_id: "epoch_1".to_string(),
            data: serde_json::json!({"name": "Old Keep"}),
            created_at: Utc::now(),
            created_by: None,
            based_on: Some("version_base".to_string()),
        };

        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json["versionId"], "version_abc");
        assert_eq!(json["epochId"], "epoch_1");
        assert_eq!(json["basedOn"], "version_base");
        // Absent attribution is omitted, not null
        assert!(json.get("createdBy").is_none());
    }

    #[test]
    fn test_latest_version_in_epoch_picks_newest() {
        let mut entity = TemporalEntity {
            entity_id: "castle_1".to_string(),
            ..Default::default()
        };
        let base = Utc::now();
        for (i, id) in ["v1", "v2", "v3"].iter().enumerate() {
            entity.versions.push(EntityVersion {
                version_id: id.to_string(),
                epoch_id: "epoch_1".to_string(),
                data: serde_json::json!({}),
                created_at: base + chrono::Duration::seconds(i as i64),
                created_by: None,
                based_on: None,
            });
        }

        let latest = entity.latest_version_in_epoch("epoch_1").unwrap();
        assert_eq!(latest.version_id, "v3");
        assert!(entity.latest_version_in_epoch("epoch_2").is_none());
    }

    #[test]
    fn test_id_generators_are_prefixed_and_unique() {
        let a = new_epoch_id();
        let b = new_epoch_id();
        assert!(a.starts_with("epoch_"));
        assert_ne!(a, b);
        assert!(new_version_id().starts_with("version_"));
    }
}
