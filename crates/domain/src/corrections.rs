//! Reviewer corrections and their deterministic merge rules.
//!
//! The state reviewer re-reads narrator prose and reports state changes the
//! logic engine missed. Each known field has its own merge rule:
//! resources coalesce onto existing current/max, scalars overwrite, lists
//! apply added/removed sets, quest progress shallow-merges.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::state::GameState;

/// Partial update to a `{current, max}` resource. Unspecified halves keep
/// their existing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCorrection {
    pub current: Option<i64>,
    pub max: Option<i64>,
}

/// Set-style edit to a string list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCorrection {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

/// Corrections extracted by the state reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCorrections {
    pub hp: Option<ResourceCorrection>,
    pub mana: Option<ResourceCorrection>,
    pub nanites: Option<ResourceCorrection>,
    pub fatigue: Option<i64>,
    pub gold: Option<i64>,
    pub experience: Option<i64>,
    pub inventory: Option<ListCorrection>,
    pub powers: Option<ListCorrection>,
    pub party_members: Option<ListCorrection>,
    pub quest_progress: Option<Map<String, Value>>,
}

impl StateCorrections {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// State keys this correction set touches, in wire casing.
    pub fn touched_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.hp.is_some() {
            keys.push("hp");
        }
        if self.mana.is_some() {
            keys.push("mana");
        }
        if self.nanites.is_some() {
            keys.push("nanites");
        }
        if self.fatigue.is_some() {
            keys.push("fatigue");
        }
        if self.gold.is_some() {
            keys.push("gold");
        }
        if self.experience.is_some() {
            keys.push("experience");
        }
        if self.inventory.is_some() {
            keys.push("inventory");
        }
        if self.powers.is_some() {
            keys.push("powers");
        }
        if self.party_members.is_some() {
            keys.push("partyMembers");
        }
        if self.quest_progress.is_some() {
            keys.push("questProgress");
        }
        keys
    }
}

/// Apply corrections to a game state. Pure, deterministic, and replay-safe:
/// list adds are deduplicated against existing contents, so applying the
/// same correction twice never double-adds an item.
pub fn apply_corrections(state: &mut GameState, corrections: &StateCorrections) {
    let fields = state.fields_mut();

    for (key, resource) in [
        ("hp", &corrections.hp),
        ("mana", &corrections.mana),
        ("nanites", &corrections.nanites),
    ] {
        if let Some(correction) = resource {
            apply_resource(fields, key, correction);
        }
    }

    for (key, scalar) in [
        ("fatigue", corrections.fatigue),
        ("gold", corrections.gold),
        ("experience", corrections.experience),
    ] {
        if let Some(value) = scalar {
            fields.insert(key.to_string(), json!(value));
        }
    }

    for (key, list) in [
        ("inventory", &corrections.inventory),
        ("powers", &corrections.powers),
        ("partyMembers", &corrections.party_members),
    ] {
        if let Some(correction) = list {
            apply_list(fields, key, correction);
        }
    }

    if let Some(progress) = &corrections.quest_progress {
        let entry = fields
            .entry("questProgress".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(existing) = entry {
            for (k, v) in progress {
                existing.insert(k.clone(), v.clone());
            }
        } else {
            *entry = Value::Object(progress.clone());
        }
    }
}

fn apply_resource(fields: &mut Map<String, Value>, key: &str, correction: &ResourceCorrection) {
    let entry = fields
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(resource) = entry {
        if let Some(current) = correction.current {
            resource.insert("current".to_string(), json!(current));
        }
        if let Some(max) = correction.max {
            resource.insert("max".to_string(), json!(max));
        }
    }
}

fn apply_list(fields: &mut Map<String, Value>, key: &str, correction: &ListCorrection) {
    let entry = fields
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        for added in &correction.added {
            let already_present = items.iter().any(|v| v.as_str() == Some(added.as_str()));
            if !already_present {
                items.push(json!(added));
            }
        }
        items.retain(|v| match v.as_str() {
            Some(s) => !correction.removed.iter().any(|r| r == s),
            None => true,
        });
    }
}
