//! World modules: selectable rulesets/themes with their own vocabulary.
//!
//! Each world carries a hard allow-list of resource names so the narrator
//! cannot bleed one world's terms (e.g. "nanites") into another.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::state::GameState;

/// A selectable ruleset/theme. Closed enum: the engine ships exactly
/// these worlds and their compiled-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldModule {
    /// Classic fantasy: Health/Mana/Stamina, gold, spellcraft.
    Classic,
    /// Post-collapse sci-fi: Health/Nanites/Energy, credits, augments.
    Outworlder,
    /// Essence-bearer setting: powers are drawn from bound essences.
    Essence,
}

impl WorldModule {
    pub const ALL: [WorldModule; 3] = [Self::Classic, Self::Outworlder, Self::Essence];

    /// Wire name used in API payloads and configuration documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Outworlder => "outworlder",
            Self::Essence => "essence",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Classic => "Classic Fantasy",
            Self::Outworlder => "Outworlder",
            Self::Essence => "Essence Bearers",
        }
    }

    /// The only resource names the narrator may use for this world.
    pub fn allowed_resources(&self) -> &'static [&'static str] {
        match self {
            Self::Classic => &["Health", "Mana", "Stamina", "Gold"],
            Self::Outworlder => &["Health", "Nanites", "Energy", "Credits"],
            Self::Essence => &["Health", "Spirit", "Essence Charge"],
        }
    }

    /// Resource vocabulary from *other* worlds that must never appear
    /// in this world's narration.
    pub fn forbidden_resources(&self) -> &'static [&'static str] {
        match self {
            Self::Classic => &["nanites", "energy", "credits", "spirit", "essence charge"],
            Self::Outworlder => &["mana", "stamina", "gold", "spirit", "essence charge"],
            Self::Essence => &["mana", "stamina", "nanites", "credits"],
        }
    }

    /// Starting module state for a freshly created campaign.
    pub fn initial_state(&self) -> GameState {
        let fields = match self {
            Self::Classic => json!({
                "hp": {"current": 20, "max": 20},
                "mana": {"current": 10, "max": 10},
                "stamina": {"current": 10, "max": 10},
                "gold": 15,
                "inventory": ["Torch", "Rations"],
                "questProgress": {}
            }),
            Self::Outworlder => json!({
                "hp": {"current": 20, "max": 20},
                "nanites": {"current": 100, "max": 100},
                "energy": {"current": 50, "max": 50},
                "credits": 40,
                "inventory": ["Scanner", "Med-Patch"],
                "questProgress": {}
            }),
            Self::Essence => json!({
                "hp": {"current": 20, "max": 20},
                "spirit": {"current": 10, "max": 10},
                "essences": [],
                "powers": [],
                "inventory": ["Traveler's Cloak"],
                "questProgress": {}
            }),
        };

        // initial_state literals above are always JSON objects
        let map = fields.as_object().cloned().unwrap_or_default();
        GameState::new(*self, map)
    }

    /// Hardcoded opening narration used when the narrator call fails
    /// during campaign creation.
    pub fn fallback_opener(&self) -> &'static str {
        match self {
            Self::Classic => {
                "Dawn breaks over the village of Thornbury. You wake in the \
                 common room of the Silver Stag inn, the smell of woodsmoke \
                 and fresh bread drifting up from below. Somewhere beyond the \
                 palisade, the old forest waits. What do you do?"
            }
            Self::Outworlder => {
                "The drop-pod's hatch grinds open onto a rust-colored sky. \
                 Your suit's nanite reservoir reads full, and the beacon you \
                 followed down is still pulsing somewhere past the wreckage \
                 field ahead. What do you do?"
            }
            Self::Essence => {
                "The shrine's last candle gutters out, and for a heartbeat \
                 you feel it: something vast turning its attention toward \
                 you. The elders said the unbound are never chosen. The \
                 elders were wrong. What do you do?"
            }
        }
    }

    /// Generic narrative fallback when a turn's narrator stage is
    /// unavailable and the logic engine supplied no cue of its own.
    pub fn fallback_narrative(&self) -> &'static str {
        match self {
            Self::Classic => "Your action unfolds, and the world shifts around you.",
            Self::Outworlder => "Your move plays out; the wasteland registers the change.",
            Self::Essence => "The essence stirs in answer to your action.",
        }
    }
}

impl fmt::Display for WorldModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorldModule {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "outworlder" => Ok(Self::Outworlder),
            "essence" => Ok(Self::Essence),
            other => Err(crate::DomainError::Parse(format!(
                "Unknown world module: '{other}'"
            ))),
        }
    }
}
