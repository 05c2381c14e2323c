//! Parsing of provider replies and the technique merge
//!
//! Primary techniques come from one call over the whole document. Each
//! auxiliary chunk then contributes findings keyed by technique id: an id
//! already present gains another evidence line, a new id becomes a new
//! technique. Insertion order is kept throughout.

use crate::dispatch::response::parse_lenient_json;
use crate::{Result, SentinelError};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub(crate) const NO_USAGE: &str = "No detailed information available";

/// One indicator of compromise as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Report details and indicators from the indicators call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFindings {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Publication date as written by the provider (DD-MM-YYYY)
    pub created: Option<String>,
    pub indicators: Vec<Indicator>,
}

/// A technique after merging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Technique {
    pub id: String,
    pub name: Option<String>,
    pub from_table: Option<String>,
    pub from_text: Option<String>,
    /// Procedure lines contributed by auxiliary chunks, in arrival order
    pub procedures: Vec<String>,
}

/// A technique found in one auxiliary chunk
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChunkFinding {
    pub technique_id: String,
    #[serde(default)]
    pub technique_name: Option<String>,
    #[serde(default)]
    pub technique_procedure: Option<String>,
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn reply_json(text: &str, what: &str) -> Result<Value> {
    parse_lenient_json(text)
        .ok_or_else(|| SentinelError::Parse(format!("{} reply contains no JSON", what)))
}

/// Parses the indicators reply
///
/// Blank strings count as missing. Indicator entries that do not match
/// the expected shape are dropped.
pub fn parse_indicator_reply(text: &str) -> Result<IndicatorFindings> {
    let value = reply_json(text, "indicators")?;
    let Value::Object(map) = value else {
        return Err(SentinelError::Parse(
            "indicators reply is not an object".to_string(),
        ));
    };

    let indicators = map
        .get("indicators")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Indicator>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(IndicatorFindings {
        name: non_blank(map.get("name")),
        description: non_blank(map.get("description")),
        created: non_blank(map.get("created")),
        indicators,
    })
}

/// Parses the techniques reply into primary techniques
///
/// `technique_usage` is normally an object with `from_table` / `from_text`;
/// a plain string is taken as text usage.
pub fn parse_technique_reply(text: &str) -> Result<Vec<Technique>> {
    let value = reply_json(text, "techniques")?;
    let items: &[Value] = match &value {
        Value::Object(map) => match map.get("techniques") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        Value::Array(items) => items.as_slice(),
        _ => {
            return Err(SentinelError::Parse(
                "techniques reply is neither an object nor an array".to_string(),
            ))
        }
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = non_blank(item.get("technique_id"))?;
            let usage = item.get("technique_usage");
            let (from_table, from_text) = match usage {
                Some(Value::Object(usage)) => {
                    (non_blank(usage.get("from_table")), non_blank(usage.get("from_text")))
                }
                Some(Value::String(_)) => (None, non_blank(usage)),
                _ => (None, None),
            };

            Some(Technique {
                id,
                name: non_blank(item.get("technique_name")),
                from_table,
                from_text,
                procedures: Vec::new(),
            })
        })
        .collect())
}

/// Parses one chunk reply, a bare array or `{"techniques": [...]}`
pub fn parse_chunk_reply(text: &str) -> Result<Vec<ChunkFinding>> {
    let value = reply_json(text, "chunk")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("techniques") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => {
            return Err(SentinelError::Parse(
                "chunk reply is neither an array nor an object".to_string(),
            ))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ChunkFinding>(item).ok())
        .filter(|finding| !finding.technique_id.trim().is_empty())
        .collect())
}

/// Techniques keyed by id, in first-seen order
#[derive(Debug, Default)]
pub struct TechniqueSet {
    by_id: IndexMap<String, Technique>,
}

impl TechniqueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Adds a primary technique; a repeated id replaces the earlier entry
    /// but keeps its position
    pub fn add_primary(&mut self, technique: Technique) {
        self.by_id.insert(technique.id.clone(), technique);
    }

    /// Folds a chunk finding into the set
    pub fn add_chunk_finding(&mut self, finding: ChunkFinding) {
        let id = finding.technique_id.trim().to_string();
        let procedure = finding
            .technique_procedure
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        match self.by_id.entry(id) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.name.is_none() {
                    existing.name = finding.technique_name;
                }
                existing.procedures.extend(procedure);
            }
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                slot.insert(Technique {
                    id,
                    name: finding.technique_name,
                    procedures: procedure.into_iter().collect(),
                    ..Technique::default()
                });
            }
        }
    }

    pub fn into_techniques(self) -> Vec<Technique> {
        self.by_id.into_values().collect()
    }
}

fn clean_line(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .collect::<String>()
        .trim()
        .to_string()
}

impl Technique {
    /// Renders the usage text shown in the report
    ///
    /// Table usage comes first (text usage when the table said nothing),
    /// followed by chunk procedures as `* ` bullet lines. Duplicate lines
    /// are dropped.
    pub fn usage_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let lead = self.from_table.as_deref().or(self.from_text.as_deref());
        if let Some(lead) = lead {
            let cleaned = clean_line(lead);
            if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
                lines.push(cleaned);
            }
        }

        for line in self.procedures.iter().flat_map(|p| p.lines()) {
            let cleaned = clean_line(line.trim().trim_start_matches('*'));
            if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
                lines.push(format!("* {}", cleaned));
            }
        }

        if lines.is_empty() {
            NO_USAGE.to_string()
        } else {
            lines.join("\n")
        }
    }
}
