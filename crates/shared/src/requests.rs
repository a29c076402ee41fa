//! Request DTOs for the turn and campaign calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use loreforge_domain::{MessageRole, WorldModule};

/// User-supplied provider credentials overriding platform-managed keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByokKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<String>,
}

/// One prior exchange in the client's bounded chat window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

/// The per-call input bundle for one player action. Ephemeral: derived
/// fresh per call, never persisted as an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub campaign_id: Uuid,
    pub user_input: String,
    pub world_module: WorldModule,
    /// This turn's starting module state, as the client last saw it.
    pub current_state: Value,
    /// Bounded window of recent messages, oldest first.
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byok_keys: Option<ByokKeys>,
    /// Whether the logic engine may attach suggested options to a
    /// pending choice.
    #[serde(default)]
    pub show_suggested_choices: bool,
    /// Warm-up ping: the narrator answers minimally and no state moves.
    #[serde(default)]
    pub is_keep_alive: bool,
}

/// Campaign creation call input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreateRequest {
    pub name: String,
    pub world_module: WorldModule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_character: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byok_keys: Option<ByokKeys>,
}
