//! The state reviewer: a throttled backup pass that re-reads narrator
//! prose and extracts state changes the logic engine missed.
//!
//! This is a cost-control throttle, not a correctness gate: skips and
//! failures here never affect the turn result.

use serde::Deserialize;
use serde_json::Value;

use crate::infrastructure::ports::{LlmPort, LlmRequest, ReviewerSettings};
use loreforge_domain::{StateCorrections, TokenUsage};

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 800;

#[derive(Debug, Default)]
pub struct ReviewerResult {
    pub skipped: bool,
    pub corrections: Option<StateCorrections>,
    pub reasoning: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl ReviewerResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewerPayload {
    #[serde(default)]
    corrections: StateCorrections,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct ReviewerEngine;

impl ReviewerEngine {
    /// Whether the reviewer runs this turn. Turn numbers are 1-based; a
    /// zero frequency is treated as disabled rather than dividing by it.
    pub fn should_run(settings: &ReviewerSettings, turn_number: u64) -> bool {
        settings.enabled && settings.frequency > 0 && turn_number % settings.frequency == 0
    }

    pub async fn run(
        client: &dyn LlmPort,
        settings: &ReviewerSettings,
        prompt_template: &str,
        current_state: &Value,
        narrative: &str,
        turn_number: u64,
    ) -> ReviewerResult {
        if !Self::should_run(settings, turn_number) {
            return ReviewerResult::skipped();
        }

        let state_json =
            serde_json::to_string_pretty(current_state).unwrap_or_else(|_| "{}".to_string());
        let prompt = prompt_template
            .replace("{currentState}", &state_json)
            .replace("{narrative}", narrative);

        let request = LlmRequest::new(vec![crate::infrastructure::ports::ChatMessage::user(
            prompt,
        )])
        .with_temperature(TEMPERATURE)
        .with_max_tokens(MAX_TOKENS);

        let response = match client.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Reviewer call failed, skipping this pass");
                return ReviewerResult::skipped();
            }
        };

        let raw = response.content.trim();
        let raw = raw
            .strip_prefix("```json")
            .or_else(|| raw.strip_prefix("```"))
            .map(|s| s.trim_end_matches("```").trim())
            .unwrap_or(raw);

        match serde_json::from_str::<ReviewerPayload>(raw) {
            Ok(payload) => ReviewerResult {
                skipped: false,
                corrections: (!payload.corrections.is_empty()).then_some(payload.corrections),
                reasoning: payload.reasoning,
                usage: response.usage,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Reviewer output unparseable, skipping this pass");
                ReviewerResult {
                    skipped: true,
                    usage: response.usage,
                    ..Default::default()
                }
            }
        }
    }
}
