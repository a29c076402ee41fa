//! The narrator ("voice"): converts mechanical cues into bounded prose.
//!
//! Output guarantee: the returned narrative never contains the hidden
//! state-report delimiters; the report, if present and parseable, comes
//! back separately as best-effort JSON.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::infrastructure::ports::{ChatMessage, ChatRole, LlmError, LlmPort, LlmRequest};
use crate::infrastructure::prompt_templates::{STATE_REPORT_INSTRUCTION, VOICE_STYLE_RULES};
use crate::use_cases::brain::NarrativeCue;
use loreforge_domain::{GameState, MessageRole, TokenUsage, WorldModule};
use loreforge_shared::{ChatTurn, DiceRollReport};

/// Prose needs more memory than mechanics.
const HISTORY_WINDOW: usize = 4;
const TEMPERATURE: f32 = 0.9;

pub const DEFAULT_WORD_MIN: u32 = 100;
pub const DEFAULT_WORD_MAX: u32 = 250;

static STATE_REPORT: LazyLock<Regex> = LazyLock::new(|| {
    // compiled-regex construction: pattern is a literal, cannot fail
    Regex::new(r"(?s)---STATE_REPORT---\s*(.*?)\s*---END_REPORT---").expect("valid report regex")
});

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Narrator call failed: {0}")]
    Provider(#[from] LlmError),
    #[error("Narrator returned an empty narrative")]
    Empty,
}

pub struct VoiceInput<'a> {
    pub world: WorldModule,
    pub state: &'a GameState,
    pub chat_history: &'a [ChatTurn],
    pub system_prompt: &'a str,
    pub knowledge: &'a [String],
    pub custom_rules: Option<&'a str>,
    pub cues: &'a [NarrativeCue],
    pub dice_rolls: &'a [DiceRollReport],
    pub state_changes: &'a Map<String, Value>,
    pub word_limit_min: u32,
    pub word_limit_max: u32,
    pub is_keep_alive: bool,
}

#[derive(Debug)]
pub struct VoiceResult {
    /// The player-facing prose, report block stripped.
    pub narrative: String,
    /// Best-effort parse of the hidden report, shape-free JSON.
    pub state_report: Option<Value>,
    pub usage: Option<TokenUsage>,
}

pub struct VoiceEngine;

impl VoiceEngine {
    pub async fn run(
        client: &dyn LlmPort,
        input: VoiceInput<'_>,
    ) -> Result<VoiceResult, VoiceError> {
        // Words run roughly 1.5 tokens each; double for headroom.
        let max_tokens = input.word_limit_max.saturating_mul(3);

        let request = LlmRequest::new(build_history(&input))
            .with_system_prompt(assemble_system_prompt(&input))
            .with_temperature(TEMPERATURE)
            .with_max_tokens(max_tokens);

        let response = client.generate(request).await?;
        if response.content.trim().is_empty() {
            return Err(VoiceError::Empty);
        }

        let (narrative, state_report) = extract_state_report(&response.content);
        Ok(VoiceResult {
            narrative,
            state_report,
            usage: response.usage,
        })
    }
}

fn assemble_system_prompt(input: &VoiceInput<'_>) -> String {
    let mut prompt = input.system_prompt.to_string();

    if !input.knowledge.is_empty() {
        prompt.push_str("\n\nREFERENCE MATERIAL:\n");
        prompt.push_str(&input.knowledge.join("\n\n"));
    }

    if let Some(rules) = input.custom_rules {
        prompt.push_str("\n\nCUSTOM RULES:\n");
        prompt.push_str(rules);
    }

    prompt.push_str(&format!(
        "\n\nRESOURCE VOCABULARY: this world's resources are {} and nothing \
         else. The terms {} belong to other worlds and must NEVER appear in \
         your narration.",
        input.world.allowed_resources().join(", "),
        input.world.forbidden_resources().join(", ")
    ));

    if input.world == WorldModule::Essence {
        let owned = input
            .state
            .fields()
            .get("essences")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        if owned.is_empty() {
            prompt.push_str(
                "\n\nESSENCE CONSTRAINT: the character has bound no essences \
                 yet. Narrate no essence-granted abilities.",
            );
        } else {
            prompt.push_str(&format!(
                "\n\nESSENCE CONSTRAINT: the character's bound essences are \
                 {owned}. Abilities you narrate must come only from these."
            ));
        }
    }

    prompt.push_str(&format!(
        "\n\nLENGTH: your narrative MUST be between {} and {} words. This is \
         non-negotiable.",
        input.word_limit_min, input.word_limit_max
    ));
    prompt.push_str("\n\n");
    prompt.push_str(VOICE_STYLE_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(STATE_REPORT_INSTRUCTION);

    prompt
}

fn build_history(input: &VoiceInput<'_>) -> Vec<ChatMessage> {
    let start = input.chat_history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages: Vec<ChatMessage> = input.chat_history[start..]
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

    messages.push(ChatMessage::user(build_cue_text(input)));
    messages
}

/// Serialize this turn's mechanics into a compact instruction block for
/// the narrator. Keep-alive pings short-circuit to a minimal payload.
fn build_cue_text(input: &VoiceInput<'_>) -> String {
    if input.is_keep_alive {
        return "(keep-alive ping: answer with one short atmospheric sentence)".to_string();
    }

    let mut text = String::from("Narrate this turn.\n");

    if !input.dice_rolls.is_empty() {
        text.push_str("\nDICE:\n");
        for roll in input.dice_rolls {
            let purpose = roll.purpose.as_deref().unwrap_or("roll");
            text.push_str(&format!(
                "- {}: {} rolled {} (total {})\n",
                purpose, roll.roll_type, roll.result, roll.total
            ));
        }
    }

    if !input.cues.is_empty() {
        text.push_str("\nEVENTS:\n");
        for cue in input.cues {
            match &cue.emotion {
                Some(emotion) => {
                    text.push_str(&format!("- [{emotion}] {}\n", cue.content));
                }
                None => text.push_str(&format!("- {}\n", cue.content)),
            }
        }
    }

    if !input.state_changes.is_empty() {
        text.push_str("\nSTATE CHANGES:\n");
        text.push_str(
            &serde_json::to_string(input.state_changes).unwrap_or_else(|_| "{}".to_string()),
        );
        text.push('\n');
    }

    text
}

/// Split the hidden report block out of the raw narrative. Parse failures
/// log and drop the report; it is an optimization, not a requirement.
fn extract_state_report(raw: &str) -> (String, Option<Value>) {
    let Some(captures) = STATE_REPORT.captures(raw) else {
        return (raw.trim().to_string(), None);
    };

    let report = captures
        .get(1)
        .and_then(|m| match serde_json::from_str::<Value>(m.as_str()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "State report block was not valid JSON, ignoring");
                None
            }
        });

    let narrative = STATE_REPORT.replace_all(raw, "").trim().to_string();
    (narrative, report)
}
