// src/db/extract.rs
//! Content extraction for the legacy flat model.
//!
//! `rebuild` re-derives every legacy entity from raw note content: entity
//! type (frontmatter first, keyword heuristics second), tags (frontmatter
//! array plus inline hashtags), a short summary, wiki-style `[[links]]`,
//! and `**Key:** Value` fact lines. All of it is tolerant scanning; a note
//! that matches nothing still yields a valid (if sparse) entity.

use std::collections::BTreeMap;

use serde_yaml::Value as YamlValue;

use crate::entity::EntityType;

pub type Frontmatter = BTreeMap<String, YamlValue>;

/// Split a note into its YAML frontmatter (if any) and body.
///
/// Frontmatter is a leading `---` fence closed by another `---` line.
/// Malformed YAML is treated as no frontmatter rather than an error.
pub fn split_frontmatter(content: &str) -> (Option<Frontmatter>, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content);
    };
    let rest = match rest.strip_prefix('\n') {
        Some(r) => r,
        None => match rest.strip_prefix("\r\n") {
            Some(r) => r,
            None => return (None, content),
        },
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return match serde_yaml::from_str::<Frontmatter>(yaml) {
                Ok(fm) => (Some(fm), body),
                Err(_) => (None, body),
            };
        }
        offset += line.len();
    }

    (None, content)
}

fn frontmatter_str<'a>(fm: Option<&'a Frontmatter>, key: &str) -> Option<&'a str> {
    fm.and_then(|m| m.get(key)).and_then(|v| v.as_str())
}

/// Keyword heuristics used when frontmatter carries no explicit type.
/// First matching type wins; scanning is case-insensitive.
const TYPE_KEYWORDS: [(EntityType, &[&str]); 6] = [
    (EntityType::Character, &["character", "protagonist", "npc"]),
    (EntityType::Location, &["location", "city", "castle", "village", "realm"]),
    (EntityType::Potion, &["potion", "elixir", "brew"]),
    (EntityType::Artifact, &["artifact", "relic", "weapon", "item"]),
    (EntityType::Event, &["event", "battle", "war", "festival"]),
    (EntityType::Organization, &["organization", "faction", "guild", "order of"]),
];

/// Determine the entity type of a note.
pub fn detect_entity_type(fm: Option<&Frontmatter>, body: &str) -> EntityType {
    if let Some(declared) = frontmatter_str(fm, "type") {
        if let Ok(t) = declared.parse() {
            return t;
        }
    }

    let haystack = body.to_lowercase();
    for (entity_type, keywords) in TYPE_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return entity_type;
        }
    }
    EntityType::Unknown
}

/// Collect tags from a frontmatter `tags:` array and inline `#hashtags`.
pub fn extract_tags(fm: Option<&Frontmatter>, body: &str) -> Vec<String> {
    let mut tags = Vec::new();

    if let Some(YamlValue::Sequence(seq)) = fm.and_then(|m| m.get("tags")) {
        for item in seq {
            if let Some(tag) = item.as_str() {
                push_unique(&mut tags, tag.to_string());
            }
        }
    }

    // Inline hashtags: '#' at a word boundary followed by an alphanumeric.
    // Markdown headings ('# ' with a space) never match.
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '#'
            && (i == 0 || chars[i - 1].is_whitespace())
            && i + 1 < chars.len()
            && chars[i + 1].is_alphanumeric()
        {
            let mut tag = String::new();
            let mut j = i + 1;
            while j < chars.len()
                && (chars[j].is_alphanumeric() || chars[j] == '-' || chars[j] == '_')
            {
                tag.push(chars[j]);
                j += 1;
            }
            push_unique(&mut tags, tag);
            i = j;
        } else {
            i += 1;
        }
    }

    tags
}

fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tag.is_empty() && !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// First non-heading, non-empty lines of the body, as a one-paragraph summary.
pub fn extract_summary(body: &str) -> String {
    let mut lines = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            if !lines.is_empty() {
                break;
            }
            continue;
        }
        lines.push(trimmed);
        if lines.len() == 2 {
            break;
        }
    }
    lines.join(" ")
}

/// Collect `[[target]]` / `[[target|label]]` references, in order, deduped.
pub fn extract_wiki_links(text: &str) -> Vec<String> {
    let mut links = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("[[") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("]]") else {
            break;
        };
        let inner = &after[..close];
        let target = inner.split('|').next().unwrap_or("").trim();
        push_unique(&mut links, target.to_string());
        rest = &after[close + 2..];
    }

    links
}

/// Collect `**Key:** Value` fact lines into a map. Later lines win on
/// duplicate keys.
pub fn extract_facts(body: &str) -> BTreeMap<String, String> {
    let mut facts = BTreeMap::new();

    for line in body.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("**") else {
            continue;
        };
        let Some(sep) = rest.find(":**") else {
            continue;
        };
        let key = rest[..sep].trim();
        let value = rest[sep + 3..].trim();
        if !key.is_empty() && !value.is_empty() {
            facts.insert(key.to_string(), value.to_string());
        }
    }

    facts
}

/// Title of a note: frontmatter `title`, else first `# Heading`, else the
/// file name without extension.
pub fn extract_title(fm: Option<&Frontmatter>, body: &str, file_name: &str) -> String {
    if let Some(title) = frontmatter_str(fm, "title") {
        return title.to_string();
    }
    for line in body.lines() {
        if let Some(heading) = line.trim().strip_prefix("# ") {
            return heading.trim().to_string();
        }
    }
    file_name
        .strip_suffix(".md")
        .unwrap_or(file_name)
        .to_string()
}
