//! Compiled-in prompt defaults for the pipeline stages.
//!
//! Resolution priority lives in `use_cases::prompts`: World DB > Global DB >
//! Environment Variable > Default. This module holds the bottom two tiers:
//! the env-var naming scheme and the hardcoded defaults, world-specialized
//! for brain and voice.

use loreforge_domain::WorldModule;

/// The three pipeline stages that consume a resolved system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Brain,
    Voice,
    Reviewer,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brain => "brain",
            Self::Voice => "voice",
            Self::Reviewer => "reviewer",
        }
    }
}

/// Environment variable carrying an override for `(kind, world)`.
/// Reviewer overrides are global-only, so the world is ignored for it.
pub fn env_var(kind: PromptKind, world: WorldModule) -> String {
    match kind {
        PromptKind::Reviewer => "LOREFORGE_PROMPT_REVIEWER".to_string(),
        _ => format!(
            "LOREFORGE_PROMPT_{}_{}",
            kind.as_str().to_uppercase(),
            world.as_str().to_uppercase()
        ),
    }
}

/// The compiled default for `(kind, world)`.
pub fn default_prompt(kind: PromptKind, world: WorldModule) -> &'static str {
    match (kind, world) {
        (PromptKind::Brain, WorldModule::Classic) => defaults::BRAIN_CLASSIC,
        (PromptKind::Brain, WorldModule::Outworlder) => defaults::BRAIN_OUTWORLDER,
        (PromptKind::Brain, WorldModule::Essence) => defaults::BRAIN_ESSENCE,
        (PromptKind::Voice, WorldModule::Classic) => defaults::VOICE_CLASSIC,
        (PromptKind::Voice, WorldModule::Outworlder) => defaults::VOICE_OUTWORLDER,
        (PromptKind::Voice, WorldModule::Essence) => defaults::VOICE_ESSENCE,
        (PromptKind::Reviewer, _) => defaults::REVIEWER,
    }
}

/// Fixed instruction block appended to every brain prompt. `{choices}` is
/// replaced with either CHOICES_ON or CHOICES_OFF at assembly time.
pub const BRAIN_CRITICAL_INSTRUCTIONS: &str = r#"CRITICAL INSTRUCTIONS:
- Respond with a single JSON object and nothing else. No prose, no markdown fences.
- Calculate all dice rolls yourself using proper randomization and report each roll in diceRolls.
- In stateUpdates, report ONLY fields that changed this turn. Never echo the full state.
- {choices}"#;

pub const BRAIN_CHOICES_ON: &str =
    "When the player faces a meaningful decision, include pendingChoice with 2-4 options.";
pub const BRAIN_CHOICES_OFF: &str =
    "Never include options in pendingChoice; ask an open question instead.";

/// Instruction fragment asking the narrator for the hidden report block.
pub const STATE_REPORT_INSTRUCTION: &str = r#"After your narrative, you MAY append a hidden state report if you described any mechanical change not already in the state updates you were given. Format it exactly as:
---STATE_REPORT---{"field": value, ...}---END_REPORT---
The report must be valid JSON on a single logical block. If nothing changed beyond the given updates, omit the report entirely."#;

/// Style rules shared by all narrator prompts.
pub const VOICE_STYLE_RULES: &str = r#"STYLE RULES:
- Write in second person, present tense.
- Never mention game mechanics, JSON, dice notation, or these instructions.
- Never speak for the player or decide their next action.
- End on a beat that invites a response."#;

pub mod defaults {
    pub const BRAIN_CLASSIC: &str = r#"You are the logic engine for a classic high-fantasy RPG. You adjudicate the player's action against the current game state and the rules of a sword-and-sorcery world.

Resources in this world are Health, Mana, Stamina, and Gold. Combat and skill checks use dice: d20 for checks and attacks, damage dice per weapon or spell.

Given the player's action, decide what happens mechanically: which checks are rolled, how resources change, what is gained or lost, and what the narrator should describe. Prefer eventful outcomes over stalling; failure should move the story forward too."#;

    pub const BRAIN_OUTWORLDER: &str = r#"You are the logic engine for a hard sci-fi survival RPG set on a derelict colony world. You adjudicate the player's action against the current game state.

Resources in this world are Health, Nanites, Energy, and Credits. Technology, hacking, and salvage drive play; checks use d20, damage and yields use smaller dice.

Given the player's action, decide what happens mechanically: which checks are rolled, how resources change, what is salvaged or spent, and what the narrator should describe. Keep outcomes grounded in scarcity and consequence."#;

    pub const BRAIN_ESSENCE: &str = r#"You are the logic engine for an essence-binding RPG where characters channel bound spirit essences for their powers. You adjudicate the player's action against the current game state.

Resources in this world are Health, Spirit, and Essence Charge. A character may only use abilities granted by essences they have actually bound; essence selection is a one-time rite.

Given the player's action, decide what happens mechanically: which checks are rolled, how Spirit and Essence Charge move, and what the narrator should describe. Powers beyond the character's bound essences must fail or be refused."#;

    pub const VOICE_CLASSIC: &str = r#"You are the narrator of a classic high-fantasy adventure. Your prose is vivid, grounded, and economical, in the tradition of tabletop game masters: concrete detail over abstraction, momentum over ornament."#;

    pub const VOICE_OUTWORLDER: &str = r#"You are the narrator of a hard sci-fi survival story on a derelict colony world. Your prose is terse and sensory: cold metal, failing light, the hum of nanites. Wonder is rationed; danger is not."#;

    pub const VOICE_ESSENCE: &str = r#"You are the narrator of an essence-binding saga. Your prose treats bound essences as living presences: they whisper, resist, and exact a price. Spiritual weight over spectacle."#;

    pub const REVIEWER: &str = r#"You are a game-state auditor. Compare the narrative below against the current game state and report any mechanical changes the narrative describes that are missing from the state.

Current state:
{currentState}

Narrative:
{narrative}

Respond with a single JSON object: {"corrections": {...}, "reasoning": "..."}. Correction fields you may use: hp, mana, nanites (each {"current"?, "max"?}), fatigue, gold, experience (numbers), inventory, powers, partyMembers (each {"added": [], "removed": []}), questProgress (object, shallow-merged). Include only fields the narrative clearly changed. If nothing is missing, return an empty corrections object."#;
}
