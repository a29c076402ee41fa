//! The logic engine ("brain"): converts player intent + state into
//! structured mechanical deltas.
//!
//! Output contract: a single JSON object with `stateUpdates`,
//! `narrativeCues`, `diceRolls`, `systemMessages`, and optional
//! `requiresUserInput` / `pendingChoice` / `narrativeCue`. Parse failure
//! fails the turn; schema failure degrades instead (best-effort state
//! updates plus a fallback narrative) so a malformed model response never
//! blocks play.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::infrastructure::ports::{ChatMessage, ChatRole, LlmError, LlmPort, LlmRequest};
use crate::infrastructure::prompt_templates::{
    BRAIN_CHOICES_OFF, BRAIN_CHOICES_ON, BRAIN_CRITICAL_INSTRUCTIONS,
};
use loreforge_domain::{GameState, MessageRole, TokenUsage, WorldModule};
use loreforge_shared::{ChatTurn, DiceRollReport, PendingChoice};

/// Messages of history handed to the model. Mechanics need little memory.
const HISTORY_WINDOW: usize = 3;
const TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 1500;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    // compiled-regex construction: pattern is a literal, cannot fail
    Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid fence regex")
});

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error("Logic engine call failed: {0}")]
    Provider(#[from] LlmError),
    #[error("Logic engine returned unparseable output: {0}")]
    Parse(String),
}

/// Per-turn input bundle for the logic engine.
pub struct BrainInput<'a> {
    pub user_input: &'a str,
    pub world: WorldModule,
    pub state: &'a GameState,
    pub chat_history: &'a [ChatTurn],
    pub system_prompt: &'a str,
    pub knowledge: &'a [String],
    pub custom_rules: Option<&'a str>,
    pub show_suggested_choices: bool,
}

/// The validated mechanical outcome of one brain invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainData {
    pub state_updates: Map<String, Value>,
    pub narrative_cues: Vec<NarrativeCue>,
    pub dice_rolls: Vec<DiceRollReport>,
    pub system_messages: Vec<String>,
    #[serde(default)]
    pub narrative_cue: Option<String>,
    // `requiresUserInput` is accepted on the wire but not carried; a
    // pending choice is the only pause signal the client acts on.
    #[serde(default)]
    pub pending_choice: Option<PendingChoice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeCue {
    #[serde(rename = "type")]
    pub cue_type: CueType,
    pub content: String,
    #[serde(default)]
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueType {
    Action,
    Dialogue,
    Description,
    Combat,
    Discovery,
}

#[derive(Debug)]
pub struct BrainResult {
    pub data: BrainData,
    /// True when schema validation failed and only best-effort state
    /// updates plus a fallback narrative survived.
    pub degraded: bool,
    pub usage: Option<TokenUsage>,
}

pub struct BrainEngine;

impl BrainEngine {
    pub async fn run(
        client: &dyn LlmPort,
        input: BrainInput<'_>,
    ) -> Result<BrainResult, BrainError> {
        let request = LlmRequest::new(build_history(input.chat_history, input.user_input, input.state))
            .with_system_prompt(assemble_system_prompt(&input))
            .with_temperature(TEMPERATURE)
            .with_max_tokens(MAX_TOKENS)
            .with_output_schema(output_schema());

        let response = client.generate(request).await?;

        let raw = strip_code_fences(&response.content);
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|e| BrainError::Parse(format!("{e}: {}", raw.chars().take(120).collect::<String>())))?;

        match serde_json::from_value::<BrainData>(parsed.clone()) {
            Ok(data) => Ok(BrainResult {
                data,
                degraded: false,
                usage: response.usage,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Logic engine output failed validation, degrading");
                Ok(BrainResult {
                    data: degraded_data(&parsed, input.world),
                    degraded: true,
                    usage: response.usage,
                })
            }
        }
    }
}

fn assemble_system_prompt(input: &BrainInput<'_>) -> String {
    let mut prompt = input.system_prompt.to_string();

    if !input.knowledge.is_empty() {
        prompt.push_str("\n\nREFERENCE MATERIAL:\n");
        prompt.push_str(&input.knowledge.join("\n\n"));
    }

    if let Some(rules) = input.custom_rules {
        prompt.push_str("\n\nCUSTOM RULES:\n");
        prompt.push_str(rules);
    }

    // Once an essence is bound, the model must never re-run the
    // character-creation selection rite.
    if input.world == WorldModule::Essence && input.state.has_selected_essence() {
        prompt.push_str(
            "\n\nESSENCE LOCK: the character has already completed essence \
             selection. Do NOT present essence choices or any \
             character-creation prompt again, under any circumstances.",
        );
    }

    let choices = if input.show_suggested_choices {
        BRAIN_CHOICES_ON
    } else {
        BRAIN_CHOICES_OFF
    };
    prompt.push_str("\n\n");
    prompt.push_str(&BRAIN_CRITICAL_INSTRUCTIONS.replace("{choices}", choices));

    prompt
}

fn build_history(history: &[ChatTurn], user_input: &str, state: &GameState) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages: Vec<ChatMessage> = history[start..]
        .iter()
        .map(|turn| ChatMessage {
            role: match turn.role {
                MessageRole::User => ChatRole::User,
                MessageRole::Narrator => ChatRole::Assistant,
                MessageRole::System => ChatRole::System,
            },
            content: turn.content.clone(),
        })
        .collect();

    messages.push(ChatMessage::user(format!(
        "CURRENT STATE:\n{}\n\nPLAYER ACTION:\n{}",
        serde_json::to_string(&state.to_value()).unwrap_or_else(|_| "{}".to_string()),
        user_input
    )));
    messages
}

fn strip_code_fences(raw: &str) -> &str {
    match CODE_FENCE.captures(raw) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(raw),
        None => raw.trim(),
    }
}

/// Best-effort recovery when the parse succeeded but the shape didn't:
/// keep whatever stateUpdates object exists and substitute a fallback
/// narrative so the turn still progresses.
fn degraded_data(parsed: &Value, world: WorldModule) -> BrainData {
    let state_updates = parsed
        .get("stateUpdates")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    BrainData {
        state_updates,
        narrative_cue: Some(world.fallback_narrative().to_string()),
        ..Default::default()
    }
}

fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "stateUpdates": {"type": "object", "additionalProperties": true},
            "narrativeCues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"enum": ["action", "dialogue", "description", "combat", "discovery"]},
                        "content": {"type": "string"},
                        "emotion": {"type": "string"}
                    },
                    "required": ["type", "content"],
                    "additionalProperties": false
                }
            },
            "diceRolls": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"type": "string"},
                        "result": {"type": "integer"},
                        "total": {"type": "integer"},
                        "modifier": {"type": "integer"},
                        "purpose": {"type": "string"}
                    },
                    "required": ["type", "result", "total"],
                    "additionalProperties": false
                }
            },
            "systemMessages": {"type": "array", "items": {"type": "string"}},
            "narrativeCue": {"type": "string"},
            "requiresUserInput": {"type": "boolean"},
            "pendingChoice": {
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "options": {"type": "array", "items": {"type": "string"}},
                    "choiceType": {"type": "string"}
                },
                "required": ["prompt", "choiceType"],
                "additionalProperties": false
            }
        },
        "required": ["stateUpdates", "narrativeCues", "diceRolls", "systemMessages"],
        "additionalProperties": false
    })
}
