// src/entity/epoch.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, ordered span of in-world time. Epochs are totally ordered by
/// `start_year`; at most one epoch per project carries `active = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Epoch {
    pub id: String,
    pub name: String,
    pub start_year: i64,
    pub end_year: i64,
    pub description: String,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Default for Epoch {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: String::new(),
            start_year: 0,
            end_year: 0,
            description: String::new(),
            active: false,
            created: now,
            updated: now,
        }
    }
}

/// Caller-supplied fields for creating or updating an epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochDraft {
    pub name: String,
    pub start_year: i64,
    pub end_year: i64,
    pub description: String,
}

impl Epoch {
    pub fn from_draft(id: String, draft: EpochDraft) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: draft.name,
            start_year: draft.start_year,
            end_year: draft.end_year,
            description: draft.description,
            active: false,
            created: now,
            updated: now,
        }
    }

    pub fn apply(&mut self, draft: EpochDraft) {
        self.name = draft.name;
        self.start_year = draft.start_year;
        self.end_year = draft.end_year;
        self.description = draft.description;
        self.updated = Utc::now();
    }
}
