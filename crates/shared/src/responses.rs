//! Response DTOs for the turn and campaign calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use loreforge_domain::TokenUsage;

/// A dice roll as reported inside the logic engine's structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollReport {
    /// Dice notation, e.g. `"d20"` or `"2d6"`.
    #[serde(rename = "type")]
    pub roll_type: String,
    /// Raw die result before modifiers.
    pub result: i64,
    /// Final total after modifiers.
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// A structured clarification request: the logic engine pauses the turn
/// and asks the player to disambiguate before state moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChoice {
    pub prompt: String,
    /// Suggested options; omitted when the client disabled suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub choice_type: String,
}

/// Unified result of one turn call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_updates: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dice_rolls: Vec<DiceRollReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_choice: Option<PendingChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Campaign creation call output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreateResponse {
    pub campaign_id: Uuid,
    pub initial_narrative: String,
}
