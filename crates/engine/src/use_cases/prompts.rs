//! Prompt resolution for the pipeline stages.
//!
//! Resolution priority: World DB > Global DB > Environment Variable >
//! Compiled Default. An explicitly null override field falls through; any
//! read error logs and falls through rather than failing the turn.

use std::sync::Arc;

use crate::infrastructure::ports::{GlobalPromptConfig, PromptConfigRepo, ReviewerSettings};
use crate::infrastructure::prompt_templates::{default_prompt, env_var, PromptKind};
use loreforge_domain::WorldModule;

/// Everything prompt-related a single turn needs, fetched once at
/// orchestration start so the pipeline stages never touch the config
/// store themselves.
#[derive(Debug, Clone)]
pub struct PromptSnapshot {
    pub brain_prompt: String,
    pub voice_prompt: String,
    pub reviewer_prompt: String,
    pub custom_rules: Option<String>,
    pub reviewer: ReviewerSettings,
}

pub struct PromptResolver {
    config_repo: Arc<dyn PromptConfigRepo>,
}

impl PromptResolver {
    pub fn new(config_repo: Arc<dyn PromptConfigRepo>) -> Self {
        Self { config_repo }
    }

    /// Build the per-turn snapshot: one global read, one world read.
    pub async fn snapshot(&self, world: WorldModule) -> PromptSnapshot {
        let global = match self.config_repo.get_global().await {
            Ok(global) => global,
            Err(e) => {
                tracing::warn!(error = %e, "Global prompt config read failed, using defaults");
                None
            }
        };

        let world_overrides = match self.config_repo.get_world(world).await {
            Ok(overrides) => overrides,
            Err(e) => {
                tracing::warn!(error = %e, %world, "World prompt config read failed, using defaults");
                None
            }
        };

        let pick = |kind: PromptKind| -> String {
            let from_world = world_overrides.as_ref().and_then(|o| match kind {
                PromptKind::Brain => o.brain_prompt.clone(),
                PromptKind::Voice => o.voice_prompt.clone(),
                PromptKind::Reviewer => o.reviewer_prompt.clone(),
            });
            let from_global = global.as_ref().and_then(|g| match kind {
                PromptKind::Brain => g.overrides.brain_prompt.clone(),
                PromptKind::Voice => g.overrides.voice_prompt.clone(),
                PromptKind::Reviewer => g.overrides.reviewer_prompt.clone(),
            });

            from_world
                .or(from_global)
                .or_else(|| std::env::var(env_var(kind, world)).ok())
                .unwrap_or_else(|| default_prompt(kind, world).to_string())
        };

        // House rules have no env or compiled tier; absent means none.
        let custom_rules = world_overrides
            .as_ref()
            .and_then(|o| o.custom_rules.clone())
            .or_else(|| {
                global
                    .as_ref()
                    .and_then(|g| g.overrides.custom_rules.clone())
            });

        PromptSnapshot {
            brain_prompt: pick(PromptKind::Brain),
            voice_prompt: pick(PromptKind::Voice),
            reviewer_prompt: pick(PromptKind::Reviewer),
            custom_rules,
            reviewer: global.map(|g| g.reviewer).unwrap_or_default(),
        }
    }
}
