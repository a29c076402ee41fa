//! The open-schema game state envelope.
//!
//! Each world module keys its own fields (hp, mana, nanites, essences, ...).
//! The engine never normalizes these; it only applies deterministic
//! delta-merges produced by the logic engine, and reviewer corrections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::world::WorldModule;

type JsonMap = Map<String, Value>;

/// A campaign's module state: a tagged, open-ended document.
///
/// Invariant: `fields` is only ever mutated through [`GameState::apply_update`]
/// or [`crate::corrections::apply_corrections`], both deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    world_module: WorldModule,
    fields: JsonMap,
}

impl GameState {
    pub fn new(world_module: WorldModule, fields: JsonMap) -> Self {
        Self {
            world_module,
            fields,
        }
    }

    /// Wrap a client-supplied state object for a single turn. Non-object
    /// values yield an empty state rather than an error: the engine trusts
    /// the given state only as this turn's starting point.
    pub fn from_value(world_module: WorldModule, value: Value) -> Self {
        let fields = value.as_object().cloned().unwrap_or_default();
        Self::new(world_module, fields)
    }

    pub fn world_module(&self) -> WorldModule {
        self.world_module
    }

    pub fn fields(&self) -> &JsonMap {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut JsonMap {
        &mut self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Merge a state-update delta into this state.
    ///
    /// Objects merge recursively so a delta of `{"hp": {"current": 18}}`
    /// keeps an existing `max`; every other value type replaces outright.
    pub fn apply_update(&mut self, delta: &JsonMap) {
        merge_delta(&mut self.fields, delta);
    }

    /// Whether the character has any bound essence recorded. Drives the
    /// essence-selection guard in the logic engine's prompt: once selected,
    /// the model must never re-run essence selection.
    pub fn has_selected_essence(&self) -> bool {
        match self.fields.get("essences") {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            _ => false,
        }
    }
}

/// The delta-merge rule: objects merge recursively, everything else
/// replaces. Public so callers stacking several deltas into one can use
/// the same rule [`GameState::apply_update`] does.
pub fn merge_delta(target: &mut Map<String, Value>, delta: &Map<String, Value>) {
    for (key, incoming) in delta {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(update)) => {
                merge_delta(existing, update);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with(fields: Value) -> GameState {
        GameState::from_value(WorldModule::Classic, fields)
    }

    fn as_map(value: Value) -> JsonMap {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_nested_merge_preserves_siblings() {
        let mut state = state_with(json!({"hp": {"current": 20, "max": 20}}));
        state.apply_update(&as_map(json!({"hp": {"current": 18}})));

        assert_eq!(state.to_value(), json!({"hp": {"current": 18, "max": 20}}));
    }

    #[test]
    fn test_scalar_replaces_outright() {
        let mut state = state_with(json!({"gold": 15, "inventory": ["Torch"]}));
        state.apply_update(&as_map(json!({"gold": 12, "inventory": ["Torch", "Rope"]})));

        assert_eq!(state.fields()["gold"], json!(12));
        assert_eq!(state.fields()["inventory"], json!(["Torch", "Rope"]));
    }

    #[test]
    fn test_merge_is_deterministic_and_idempotent_for_same_delta() {
        let delta = as_map(json!({"hp": {"current": 12}, "fatigue": 3}));
        let mut a = state_with(json!({"hp": {"current": 20, "max": 20}}));
        let mut b = a.clone();

        a.apply_update(&delta);
        b.apply_update(&delta);
        b.apply_update(&delta);

        assert_eq!(a, b);
    }

    #[test]
    fn test_from_value_tolerates_non_object() {
        let state = GameState::from_value(WorldModule::Outworlder, json!("not a map"));
        assert!(state.fields().is_empty());
    }

    #[test]
    fn test_essence_guard() {
        let none = state_with(json!({"essences": []}));
        assert!(!none.has_selected_essence());

        let some = state_with(json!({"essences": ["Stormheart"]}));
        assert!(some.has_selected_essence());
    }
}
