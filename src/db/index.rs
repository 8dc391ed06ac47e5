// src/db/index.rs
//! Derived Markdown index (`_lore/index.md`).
//!
//! A grouped-by-type, human-readable listing of the legacy entities.
//! Regenerated wholesale on every database save and never parsed back in.

use chrono::{DateTime, Utc};

use crate::entity::{EntityType, LegacyEntity, LoreDatabase};

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn entity_line(entity: &LegacyEntity) -> String {
    let mut line = format!("- **{}**", entity.title);
    if !entity.path.is_empty() {
        line.push_str(&format!(" (`{}`)", entity.path));
    }
    if !entity.summary.is_empty() {
        line.push_str(&format!(" - {}", entity.summary));
    }
    if !entity.tags.is_empty() {
        let tags: Vec<String> = entity.tags.iter().map(|t| format!("#{}", t)).collect();
        line.push_str(&format!(" `{}`", tags.join(" ")));
    }
    line.push('\n');
    line
}

fn type_section(entity_type: EntityType, entities: &[&LegacyEntity]) -> String {
    if entities.is_empty() {
        return String::new();
    }

    let mut section = format!("## {}\n\n", entity_type.plural_label());
    let mut sorted = entities.to_vec();
    sorted.sort_by(|a, b| a.title.cmp(&b.title));

    for entity in sorted {
        section.push_str(&entity_line(entity));
    }
    section.push('\n');
    section
}

/// Render the full index document for a database.
pub fn render_index(db: &LoreDatabase) -> String {
    let mut content = String::from("# Lore Index\n\n");
    content.push_str("> Auto-generated from the lore database. Do not edit directly.\n\n");

    if !db.globals.world_info.is_empty() {
        content.push_str("## World\n\n");
        for (key, value) in &db.globals.world_info {
            content.push_str(&format!("- **{}:** {}\n", key, value));
        }
        content.push('\n');
    }

    // Summary table
    content.push_str("## Summary\n\n");
    content.push_str("| Type | Count |\n");
    content.push_str("|------|-------|\n");
    for entity_type in EntityType::ALL {
        let count = db
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .count();
        if count > 0 {
            content.push_str(&format!("| {} | {} |\n", entity_type.plural_label(), count));
        }
    }
    content.push('\n');

    if db.entities.is_empty() {
        content.push_str("*No entities yet.*\n\n");
    } else {
        for entity_type in EntityType::ALL {
            let of_type: Vec<&LegacyEntity> = db
                .entities
                .iter()
                .filter(|e| e.entity_type == entity_type)
                .collect();
            content.push_str(&type_section(entity_type, &of_type));
        }
    }

    content.push_str("---\n\n");
    content.push_str(&format!("*Generated: {}*\n", format_timestamp(&db.updated_at)));
    content
}
