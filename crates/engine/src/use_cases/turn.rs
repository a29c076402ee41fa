//! The turn orchestrator: one player action in, one unified result out.
//!
//! State machine per turn: key resolution, knowledge fetch, logic engine,
//! narrator (or fallback), reviewer pass, persist. Only a logic-engine
//! failure or a missing mandatory key fails a turn; everything downstream
//! of a successful brain result degrades instead of failing.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::infrastructure::ports::{CampaignRepo, ClockPort, UsageRepo};
use crate::infrastructure::providers::{self, ProviderKind};
use crate::infrastructure::resilient_llm::{ResilientLlmClient, RetryConfig};
use crate::use_cases::brain::{BrainEngine, BrainInput, BrainResult};
use crate::use_cases::knowledge::{Audience, KnowledgeRetriever};
use crate::use_cases::prompts::{PromptResolver, PromptSnapshot};
use crate::use_cases::reviewer::ReviewerEngine;
use crate::use_cases::voice::{VoiceEngine, VoiceInput, DEFAULT_WORD_MAX, DEFAULT_WORD_MIN};
use crate::infrastructure::ports::LlmPort;
use loreforge_domain::{
    apply_corrections, merge_delta, Campaign, CampaignId, GameState, MessageRole, StoredMessage,
    TokenUsage,
};
use loreforge_shared::{ByokKeys, TurnRequest, TurnResponse};

/// Platform-managed provider secrets, read once at startup. BYOK keys
/// from the request override these per provider.
#[derive(Debug, Clone, Default)]
pub struct PlatformKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google: Option<String>,
}

impl PlatformKeys {
    pub fn from_env() -> Self {
        Self {
            openai: std::env::var("OPENAI_API_KEY").ok(),
            anthropic: std::env::var("ANTHROPIC_API_KEY").ok(),
            google: std::env::var("GOOGLE_API_KEY").ok(),
        }
    }
}

/// Models per pipeline stage. The reviewer's model lives in the stored
/// reviewer settings instead; its provider is picked by name prefix.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub brain_model: String,
    pub voice_model: String,
    pub knowledge_budget_tokens: usize,
    pub word_limit_min: u32,
    pub word_limit_max: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            brain_model: "gpt-4o".to_string(),
            voice_model: "claude-3-5-sonnet-latest".to_string(),
            knowledge_budget_tokens: 2000,
            word_limit_min: DEFAULT_WORD_MIN,
            word_limit_max: DEFAULT_WORD_MAX,
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brain_model: std::env::var("LOREFORGE_BRAIN_MODEL")
                .unwrap_or(defaults.brain_model),
            voice_model: std::env::var("LOREFORGE_VOICE_MODEL")
                .unwrap_or(defaults.voice_model),
            ..defaults
        }
    }
}

/// Seam for per-turn client construction, so pipeline tests can script
/// providers without network.
pub trait LlmFactory: Send + Sync {
    fn client(&self, kind: ProviderKind, api_key: &str, model: &str) -> Arc<dyn LlmPort>;
}

pub struct HttpLlmFactory;

impl LlmFactory for HttpLlmFactory {
    fn client(&self, kind: ProviderKind, api_key: &str, model: &str) -> Arc<dyn LlmPort> {
        providers::build_client(kind, api_key, model)
    }
}

pub struct TurnOrchestrator {
    campaigns: Arc<dyn CampaignRepo>,
    prompts: Arc<PromptResolver>,
    knowledge: Arc<KnowledgeRetriever>,
    usage: Arc<dyn UsageRepo>,
    clock: Arc<dyn ClockPort>,
    factory: Arc<dyn LlmFactory>,
    platform_keys: PlatformKeys,
    models: ModelConfig,
    /// One in-flight turn per campaign; concurrent requests queue here
    /// instead of racing on the state merge.
    locks: DashMap<CampaignId, Arc<Mutex<()>>>,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignRepo>,
        prompts: Arc<PromptResolver>,
        knowledge: Arc<KnowledgeRetriever>,
        usage: Arc<dyn UsageRepo>,
        clock: Arc<dyn ClockPort>,
        factory: Arc<dyn LlmFactory>,
        platform_keys: PlatformKeys,
        models: ModelConfig,
    ) -> Self {
        Self {
            campaigns,
            prompts,
            knowledge,
            usage,
            clock,
            factory,
            platform_keys,
            models,
            locks: DashMap::new(),
        }
    }

    fn key_for(&self, kind: ProviderKind, byok: Option<&ByokKeys>) -> Option<String> {
        let from_byok = byok.and_then(|keys| match kind {
            ProviderKind::OpenAi => keys.openai.clone(),
            ProviderKind::Anthropic => keys.anthropic.clone(),
            ProviderKind::Google => keys.google.clone(),
        });
        from_byok.or_else(|| match kind {
            ProviderKind::OpenAi => self.platform_keys.openai.clone(),
            ProviderKind::Anthropic => self.platform_keys.anthropic.clone(),
            ProviderKind::Google => self.platform_keys.google.clone(),
        })
    }

    pub async fn execute(&self, request: TurnRequest) -> TurnResponse {
        let campaign_id = CampaignId::from(request.campaign_id);

        let lock = self
            .locks
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let response = {
            let _guard = lock.lock().await;
            self.run_turn(campaign_id, request).await
        };
        // Two holders means only the map entry and this turn's clone:
        // nobody is queued behind us, so the entry can go.
        self.locks
            .remove_if(&campaign_id, |_, entry| Arc::strong_count(entry) == 2);
        response
    }

    async fn run_turn(&self, campaign_id: CampaignId, request: TurnRequest) -> TurnResponse {
        let campaign = match self.campaigns.get(campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => return TurnResponse::failure("Campaign not found"),
            Err(e) => {
                tracing::error!(error = %e, %campaign_id, "Campaign load failed");
                return TurnResponse::failure("Campaign could not be loaded");
            }
        };

        let snapshot = self.prompts.snapshot(request.world_module).await;
        let state = GameState::from_value(request.world_module, request.current_state.clone());

        // Lore documents feed the narrator only; the logic engine prompt
        // carries no knowledge section.
        let max_docs =
            crate::use_cases::knowledge::docs_for_budget(self.models.knowledge_budget_tokens);
        let knowledge = self
            .knowledge
            .fetch(request.world_module, Audience::Voice, max_docs)
            .await;

        let byok = request.byok_keys.as_ref();

        if request.is_keep_alive {
            return self
                .keep_alive(&request, &state, &snapshot, &knowledge, byok)
                .await;
        }

        // KeyResolution: the logic engine's key is mandatory.
        let Some(brain_key) = self.key_for(ProviderKind::OpenAi, byok) else {
            return TurnResponse::failure("No OpenAI API key available");
        };

        // BrainInvoke: the only stage allowed to fail the turn.
        let brain_client = ResilientLlmClient::new(
            self.factory
                .client(ProviderKind::OpenAi, &brain_key, &self.models.brain_model),
            RetryConfig::default(),
        );
        let brain = match BrainEngine::run(
            &brain_client,
            BrainInput {
                user_input: &request.user_input,
                world: request.world_module,
                state: &state,
                chat_history: &request.chat_history,
                system_prompt: &snapshot.brain_prompt,
                knowledge: &[],
                custom_rules: snapshot.custom_rules.as_deref(),
                show_suggested_choices: request.show_suggested_choices,
            },
        )
        .await
        {
            Ok(brain) => brain,
            Err(e) => {
                tracing::error!(error = %e, %campaign_id, "Logic engine failed, turn aborted");
                return TurnResponse::failure(e.to_string());
            }
        };

        if brain.degraded {
            tracing::warn!(%campaign_id, "Logic engine output degraded, continuing with partial updates");
        }

        let mut total_usage = brain.usage.unwrap_or_default();

        // VoiceInvoke, or fallback narrative. Never fails the turn.
        let (narrative, state_report, voice_usage) = self
            .narrate(&request, &state, &snapshot, &knowledge, byok, &brain)
            .await;
        if let Some(usage) = voice_usage {
            total_usage.add(usage);
        }

        // Merge the turn's deltas into a fresh copy of the state, and
        // mirror the same merge into the client-facing delta so a client
        // patching locally lands on the stored state.
        let mut new_state = state.clone();
        let mut state_updates = brain.data.state_updates.clone();
        new_state.apply_update(&brain.data.state_updates);
        if let Some(Value::Object(report)) = &state_report {
            new_state.apply_update(report);
            merge_delta(&mut state_updates, report);
        }

        // Reviewer pass, throttled. Corrections merge deterministically.
        let turn_number = campaign.turns_played + 1;
        if ReviewerEngine::should_run(&snapshot.reviewer, turn_number) {
            let kind = ProviderKind::for_model(&snapshot.reviewer.model);
            if let Some(key) = self.key_for(kind, byok) {
                let client = self.factory.client(kind, &key, &snapshot.reviewer.model);
                let review = ReviewerEngine::run(
                    client.as_ref(),
                    &snapshot.reviewer,
                    &snapshot.reviewer_prompt,
                    &new_state.to_value(),
                    &narrative,
                    turn_number,
                )
                .await;
                if let Some(usage) = review.usage {
                    total_usage.add(usage);
                }
                if let Some(reasoning) = &review.reasoning {
                    tracing::debug!(%campaign_id, %reasoning, "Reviewer reasoning");
                }
                if let Some(corrections) = review.corrections {
                    tracing::info!(%campaign_id, turn_number, "Applying reviewer corrections");
                    apply_corrections(&mut new_state, &corrections);
                    // Echo corrected fields at their final values, so the
                    // next turn's client-supplied state keeps them.
                    for key in corrections.touched_keys() {
                        if let Some(value) = new_state.fields().get(key) {
                            state_updates.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        // Persist: user msg, narrator msg, state, counters. Failures are
        // logged and swallowed; the player still gets their narrative.
        self.persist(&campaign, &request, &narrative, &new_state, total_usage)
            .await;

        TurnResponse {
            success: true,
            narrative_text: Some(narrative),
            state_updates: Some(Value::Object(state_updates)),
            dice_rolls: brain.data.dice_rolls,
            system_messages: brain.data.system_messages,
            pending_choice: brain.data.pending_choice,
            token_usage: Some(total_usage),
            error: None,
        }
    }

    /// Warm-up ping: a minimal narrator round-trip, no state movement,
    /// nothing persisted, nothing metered.
    async fn keep_alive(
        &self,
        request: &TurnRequest,
        state: &GameState,
        snapshot: &PromptSnapshot,
        knowledge: &[String],
        byok: Option<&ByokKeys>,
    ) -> TurnResponse {
        let narrative = match self.key_for(ProviderKind::Anthropic, byok) {
            Some(key) => {
                let client =
                    self.factory
                        .client(ProviderKind::Anthropic, &key, &self.models.voice_model);
                let empty = serde_json::Map::new();
                match VoiceEngine::run(
                    client.as_ref(),
                    VoiceInput {
                        world: request.world_module,
                        state,
                        chat_history: &request.chat_history,
                        system_prompt: &snapshot.voice_prompt,
                        knowledge,
                        custom_rules: snapshot.custom_rules.as_deref(),
                        cues: &[],
                        dice_rolls: &[],
                        state_changes: &empty,
                        word_limit_min: 10,
                        word_limit_max: 40,
                        is_keep_alive: true,
                    },
                )
                .await
                {
                    Ok(result) => result.narrative,
                    Err(_) => request.world_module.fallback_narrative().to_string(),
                }
            }
            None => request.world_module.fallback_narrative().to_string(),
        };

        TurnResponse {
            success: true,
            narrative_text: Some(narrative),
            ..Default::default()
        }
    }

    /// Narrator stage. Absent key or any failure falls back to the logic
    /// engine's cue (or the world template); the turn still succeeds.
    async fn narrate(
        &self,
        request: &TurnRequest,
        state: &GameState,
        snapshot: &PromptSnapshot,
        knowledge: &[String],
        byok: Option<&ByokKeys>,
        brain: &BrainResult,
    ) -> (String, Option<Value>, Option<TokenUsage>) {
        let fallback = || {
            brain
                .data
                .narrative_cue
                .clone()
                .unwrap_or_else(|| request.world_module.fallback_narrative().to_string())
        };

        let Some(voice_key) = self.key_for(ProviderKind::Anthropic, byok) else {
            tracing::debug!("No Anthropic-class key, using narrative fallback");
            return (fallback(), None, None);
        };

        let client =
            self.factory
                .client(ProviderKind::Anthropic, &voice_key, &self.models.voice_model);
        match VoiceEngine::run(
            client.as_ref(),
            VoiceInput {
                world: request.world_module,
                state,
                chat_history: &request.chat_history,
                system_prompt: &snapshot.voice_prompt,
                knowledge,
                custom_rules: snapshot.custom_rules.as_deref(),
                cues: &brain.data.narrative_cues,
                dice_rolls: &brain.data.dice_rolls,
                state_changes: &brain.data.state_updates,
                word_limit_min: self.models.word_limit_min,
                word_limit_max: self.models.word_limit_max,
                is_keep_alive: false,
            },
        )
        .await
        {
            Ok(result) => (result.narrative, result.state_report, result.usage),
            Err(e) => {
                tracing::warn!(error = %e, "Narrator failed, using narrative fallback");
                (fallback(), None, None)
            }
        }
    }

    async fn persist(
        &self,
        campaign: &Campaign,
        request: &TurnRequest,
        narrative: &str,
        new_state: &GameState,
        usage: TokenUsage,
    ) {
        let now = self.clock.now();

        let user_msg =
            StoredMessage::new(campaign.id, MessageRole::User, &request.user_input, now);
        if let Err(e) = self.campaigns.append_message(&user_msg).await {
            tracing::error!(error = %e, "User message persist failed");
        }

        let narrator_msg = StoredMessage::new(campaign.id, MessageRole::Narrator, narrative, now)
            .with_usage(usage);
        if let Err(e) = self.campaigns.append_message(&narrator_msg).await {
            tracing::error!(error = %e, "Narrator message persist failed");
        }

        let mut updated = campaign.clone();
        updated.state = new_state.clone();
        updated.turns_played += 1;
        updated.updated_at = now;
        if let Err(e) = self.campaigns.save(&updated).await {
            tracing::error!(error = %e, "Campaign state persist failed");
        }

        // Metering is keyed by campaign; there is no auth layer here.
        if let Err(e) = self
            .usage
            .record_turn(&campaign.id.to_string(), usage)
            .await
        {
            tracing::error!(error = %e, "Usage counter increment failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{
        GlobalPromptConfig, KnowledgeDoc, LlmError, LlmRequest, LlmResponse, MockCampaignRepo,
        MockKnowledgeRepo, MockPromptConfigRepo, MockUsageRepo, PromptOverrides, ReviewerSettings,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use loreforge_domain::{DocumentId, WorldModule};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct ScriptedLlm {
        kind: ProviderKind,
        reply: String,
        requests: Arc<StdMutex<HashMap<ProviderKind, LlmRequest>>>,
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.requests.lock().expect("lock").insert(self.kind, request);
            Ok(LlmResponse {
                content: self.reply.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                }),
            })
        }
    }

    /// Factory scripting one reply per provider, recording which
    /// providers were asked for a client and what each was sent.
    struct ScriptedFactory {
        replies: HashMap<ProviderKind, String>,
        built: StdMutex<Vec<ProviderKind>>,
        requests: Arc<StdMutex<HashMap<ProviderKind, LlmRequest>>>,
    }

    impl ScriptedFactory {
        fn new(replies: &[(ProviderKind, &str)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(kind, reply)| (*kind, reply.to_string()))
                    .collect(),
                built: StdMutex::new(Vec::new()),
                requests: Arc::new(StdMutex::new(HashMap::new())),
            }
        }
    }

    impl LlmFactory for ScriptedFactory {
        fn client(&self, kind: ProviderKind, _api_key: &str, _model: &str) -> Arc<dyn LlmPort> {
            self.built.lock().expect("lock").push(kind);
            Arc::new(ScriptedLlm {
                kind,
                reply: self.replies.get(&kind).cloned().unwrap_or_default(),
                requests: Arc::clone(&self.requests),
            })
        }
    }

    fn brain_reply() -> String {
        json!({
            "stateUpdates": {"hp": {"current": 18, "max": 20}},
            "narrativeCues": [{"type": "combat", "content": "Sword connects."}],
            "diceRolls": [{"type": "d20", "result": 15, "total": 17, "purpose": "Attack Roll"}],
            "systemMessages": [],
            "narrativeCue": "Your strike lands."
        })
        .to_string()
    }

    fn sample_campaign() -> Campaign {
        Campaign::new(
            "Test Campaign",
            WorldModule::Classic,
            json!({"name": "Kara"}),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("ts"),
        )
    }

    fn turn_request(campaign: &Campaign, byok: ByokKeys) -> TurnRequest {
        TurnRequest {
            campaign_id: Uuid::from(campaign.id),
            user_input: "I attack the goblin".to_string(),
            world_module: WorldModule::Classic,
            current_state: json!({"hp": {"current": 20, "max": 20}}),
            chat_history: vec![],
            byok_keys: Some(byok),
            show_suggested_choices: false,
            is_keep_alive: false,
        }
    }

    fn orchestrator(
        campaign: Campaign,
        factory: Arc<dyn LlmFactory>,
        expect_persist: bool,
    ) -> TurnOrchestrator {
        let mut campaigns = MockCampaignRepo::new();
        let loaded = campaign.clone();
        campaigns
            .expect_get()
            .returning(move |_| Ok(Some(loaded.clone())));
        if expect_persist {
            campaigns.expect_append_message().times(2).returning(|_| Ok(()));
            campaigns
                .expect_save()
                .times(1)
                .withf(|saved| {
                    saved.turns_played == 1
                        && saved.state.fields()["hp"] == json!({"current": 18, "max": 20})
                })
                .returning(|_| Ok(()));
        } else {
            campaigns.expect_append_message().never();
            campaigns.expect_save().never();
        }

        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| Ok(None));
        prompt_repo.expect_get_world().returning(|_| Ok(None));

        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| Ok(vec![]));

        let mut usage_repo = MockUsageRepo::new();
        if expect_persist {
            usage_repo.expect_record_turn().times(1).returning(|_, _| Ok(()));
        } else {
            usage_repo.expect_record_turn().never();
        }

        TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(usage_repo),
            Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).single().expect("ts"),
            )),
            factory,
            PlatformKeys::default(),
            ModelConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_happy_path_persists_and_returns_narrative() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain_reply()),
            (
                ProviderKind::Anthropic,
                "Your sword bites into the goblin's shoulder and it reels back, shrieking.",
            ),
        ]));
        let orchestrator = orchestrator(campaign.clone(), factory, true);

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        let narrative = response.narrative_text.expect("narrative");
        assert!(narrative.contains("goblin"));
        assert_eq!(
            response.state_updates.expect("updates")["hp"],
            json!({"current": 18, "max": 20})
        );
        assert_eq!(response.dice_rolls[0].total, 17);
        // Brain + voice usage summed.
        assert_eq!(response.token_usage.expect("usage").total_tokens, 300);
        // The per-campaign lock entry is dropped once the turn is done.
        assert!(orchestrator.locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_anthropic_key_falls_back_to_cue() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[(
            ProviderKind::OpenAi,
            &brain_reply(),
        )]));
        let factory_dyn: Arc<dyn LlmFactory> = factory.clone();
        let orchestrator = orchestrator(campaign.clone(), factory_dyn, true);

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: None,
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        assert_eq!(response.narrative_text.as_deref(), Some("Your strike lands."));
        // The narrator client was never built.
        assert!(!factory
            .built
            .lock()
            .expect("lock")
            .contains(&ProviderKind::Anthropic));
    }

    #[tokio::test]
    async fn test_missing_openai_key_fails_the_turn() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[]));
        let orchestrator = orchestrator(campaign.clone(), factory, false);

        let response = orchestrator
            .execute(turn_request(&campaign, ByokKeys::default()))
            .await;

        assert!(!response.success);
        assert!(response.error.expect("error").contains("OpenAI"));
    }

    #[tokio::test]
    async fn test_brain_parse_failure_fails_turn_without_persisting() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, "not json at all"),
            (ProviderKind::Anthropic, "unused"),
        ]));
        let orchestrator = orchestrator(campaign.clone(), factory, false);

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(!response.success);
        assert!(response.narrative_text.is_none());
    }

    #[tokio::test]
    async fn test_voice_state_report_merged_into_updates() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain_reply()),
            (
                ProviderKind::Anthropic,
                "The goblin staggers.\n---STATE_REPORT---{\"fatigue\":2}---END_REPORT---",
            ),
        ]));
        let orchestrator = orchestrator(campaign.clone(), factory, true);

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        let narrative = response.narrative_text.expect("narrative");
        assert!(!narrative.contains("STATE_REPORT"));
        let updates = response.state_updates.expect("updates");
        assert_eq!(updates["fatigue"], json!(2));
        assert_eq!(updates["hp"], json!({"current": 18, "max": 20}));
    }

    #[tokio::test]
    async fn test_overlapping_report_key_deep_merges_into_updates() {
        let campaign = sample_campaign();
        let brain = json!({
            "stateUpdates": {"hp": {"current": 18, "max": 25}},
            "narrativeCues": [],
            "diceRolls": [],
            "systemMessages": [],
            "narrativeCue": "Your strike lands."
        })
        .to_string();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain),
            (
                ProviderKind::Anthropic,
                "You bleed freely.\n---STATE_REPORT---{\"hp\":{\"current\":5}}---END_REPORT---",
            ),
        ]));

        let mut campaigns = MockCampaignRepo::new();
        let loaded = campaign.clone();
        campaigns
            .expect_get()
            .returning(move |_| Ok(Some(loaded.clone())));
        campaigns.expect_append_message().times(2).returning(|_| Ok(()));
        campaigns
            .expect_save()
            .times(1)
            .withf(|saved| saved.state.fields()["hp"] == json!({"current": 5, "max": 25}))
            .returning(|_| Ok(()));
        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| Ok(None));
        prompt_repo.expect_get_world().returning(|_| Ok(None));
        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| Ok(vec![]));
        let mut usage_repo = MockUsageRepo::new();
        usage_repo.expect_record_turn().returning(|_, _| Ok(()));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(usage_repo),
            Arc::new(FixedClock(Utc::now())),
            factory,
            PlatformKeys::default(),
            ModelConfig::default(),
        );

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        // The report's `current` lands without losing the brain's `max`,
        // matching what was persisted.
        assert_eq!(
            response.state_updates.expect("updates")["hp"],
            json!({"current": 5, "max": 25})
        );
    }

    #[tokio::test]
    async fn test_knowledge_reaches_narrator_but_not_logic_engine() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain_reply()),
            (ProviderKind::Anthropic, "The goblin recoils from your torch."),
        ]));
        let factory_dyn: Arc<dyn LlmFactory> = factory.clone();

        let mut campaigns = MockCampaignRepo::new();
        let loaded = campaign.clone();
        campaigns
            .expect_get()
            .returning(move |_| Ok(Some(loaded.clone())));
        campaigns.expect_append_message().returning(|_| Ok(()));
        campaigns.expect_save().returning(|_| Ok(()));
        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| Ok(None));
        prompt_repo.expect_get_world().returning(|_| Ok(None));
        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| {
            Ok(vec![KnowledgeDoc {
                id: DocumentId::new(),
                name: "Goblin Lore".to_string(),
                world_module: "global".to_string(),
                category: "Lore".to_string(),
                content: "Goblins fear fire.".to_string(),
                target_model: Some("both".to_string()),
                enabled: true,
            }])
        });
        let mut usage_repo = MockUsageRepo::new();
        usage_repo.expect_record_turn().returning(|_, _| Ok(()));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(usage_repo),
            Arc::new(FixedClock(Utc::now())),
            factory_dyn,
            PlatformKeys::default(),
            ModelConfig::default(),
        );

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;
        assert!(response.success);

        let requests = factory.requests.lock().expect("lock");
        let voice_system = requests[&ProviderKind::Anthropic]
            .system_prompt
            .as_deref()
            .expect("voice system prompt");
        assert!(voice_system.contains("Goblins fear fire."));
        let brain_system = requests[&ProviderKind::OpenAi]
            .system_prompt
            .as_deref()
            .expect("brain system prompt");
        assert!(!brain_system.contains("REFERENCE MATERIAL"));
        assert!(!brain_system.contains("Goblins fear fire."));
    }

    #[tokio::test]
    async fn test_reviewer_corrections_reach_state_and_response() {
        let campaign = sample_campaign();
        let brain = json!({
            "stateUpdates": {"hp": {"current": 18, "max": 20}},
            "narrativeCues": [],
            "diceRolls": [],
            "systemMessages": [],
            "narrativeCue": "Your strike lands."
        })
        .to_string();
        let review = json!({
            "corrections": {"gold": 3},
            "reasoning": "The narrative describes looting three coins."
        })
        .to_string();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain),
            (ProviderKind::Anthropic, "You pocket three tarnished coins."),
            (ProviderKind::Google, &review),
        ]));

        let mut campaigns = MockCampaignRepo::new();
        let loaded = campaign.clone();
        campaigns
            .expect_get()
            .returning(move |_| Ok(Some(loaded.clone())));
        campaigns.expect_append_message().times(2).returning(|_| Ok(()));
        campaigns
            .expect_save()
            .times(1)
            .withf(|saved| {
                saved.state.fields()["gold"] == json!(3)
                    && saved.state.fields()["hp"] == json!({"current": 18, "max": 20})
            })
            .returning(|_| Ok(()));
        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| {
            Ok(Some(GlobalPromptConfig {
                overrides: PromptOverrides::default(),
                reviewer: ReviewerSettings {
                    enabled: true,
                    frequency: 1,
                    model: "gemini-2.0-flash".to_string(),
                },
            }))
        });
        prompt_repo.expect_get_world().returning(|_| Ok(None));
        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| Ok(vec![]));
        let mut usage_repo = MockUsageRepo::new();
        usage_repo.expect_record_turn().returning(|_, _| Ok(()));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(usage_repo),
            Arc::new(FixedClock(Utc::now())),
            factory,
            PlatformKeys::default(),
            ModelConfig::default(),
        );

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: Some("g-test".to_string()),
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        let updates = response.state_updates.expect("updates");
        // The corrected field comes back at its final value.
        assert_eq!(updates["gold"], json!(3));
        assert_eq!(updates["hp"], json!({"current": 18, "max": 20}));
        // Brain + voice + reviewer usage summed.
        assert_eq!(response.token_usage.expect("usage").total_tokens, 450);
    }

    #[tokio::test]
    async fn test_reviewer_without_key_is_skipped() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[
            (ProviderKind::OpenAi, &brain_reply()),
            (ProviderKind::Anthropic, "The goblin reels back."),
        ]));
        let factory_dyn: Arc<dyn LlmFactory> = factory.clone();

        let mut campaigns = MockCampaignRepo::new();
        let loaded = campaign.clone();
        campaigns
            .expect_get()
            .returning(move |_| Ok(Some(loaded.clone())));
        campaigns.expect_append_message().times(2).returning(|_| Ok(()));
        campaigns
            .expect_save()
            .times(1)
            .withf(|saved| saved.state.fields()["hp"] == json!({"current": 18, "max": 20}))
            .returning(|_| Ok(()));
        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| {
            Ok(Some(GlobalPromptConfig {
                overrides: PromptOverrides::default(),
                reviewer: ReviewerSettings {
                    enabled: true,
                    frequency: 1,
                    model: "gemini-2.0-flash".to_string(),
                },
            }))
        });
        prompt_repo.expect_get_world().returning(|_| Ok(None));
        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| Ok(vec![]));
        let mut usage_repo = MockUsageRepo::new();
        usage_repo.expect_record_turn().returning(|_, _| Ok(()));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(usage_repo),
            Arc::new(FixedClock(Utc::now())),
            factory_dyn,
            PlatformKeys::default(),
            ModelConfig::default(),
        );

        // No Google key anywhere, so the reviewer's provider is unusable.
        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let response = orchestrator.execute(turn_request(&campaign, byok)).await;

        assert!(response.success);
        assert!(!factory
            .built
            .lock()
            .expect("lock")
            .contains(&ProviderKind::Google));
    }

    #[tokio::test]
    async fn test_keep_alive_persists_nothing() {
        let campaign = sample_campaign();
        let factory = Arc::new(ScriptedFactory::new(&[(
            ProviderKind::Anthropic,
            "A quiet wind stirs the trees.",
        )]));
        let orchestrator = orchestrator(campaign.clone(), factory, false);

        let byok = ByokKeys {
            openai: Some("sk-test".to_string()),
            anthropic: Some("sk-ant-test".to_string()),
            google: None,
        };
        let mut request = turn_request(&campaign, byok);
        request.is_keep_alive = true;
        let response = orchestrator.execute(request).await;

        assert!(response.success);
        assert_eq!(
            response.narrative_text.as_deref(),
            Some("A quiet wind stirs the trees.")
        );
        assert!(response.state_updates.is_none());
    }

    #[tokio::test]
    async fn test_unknown_campaign_fails() {
        let mut campaigns = MockCampaignRepo::new();
        campaigns.expect_get().returning(|_| Ok(None));
        let mut prompt_repo = MockPromptConfigRepo::new();
        prompt_repo.expect_get_global().returning(|| Ok(None));
        prompt_repo.expect_get_world().returning(|_| Ok(None));
        let mut knowledge_repo = MockKnowledgeRepo::new();
        knowledge_repo.expect_list_enabled().returning(|| Ok(vec![]));

        let orchestrator = TurnOrchestrator::new(
            Arc::new(campaigns),
            Arc::new(PromptResolver::new(Arc::new(prompt_repo))),
            Arc::new(KnowledgeRetriever::new(Arc::new(knowledge_repo))),
            Arc::new(MockUsageRepo::new()),
            Arc::new(FixedClock(Utc::now())),
            Arc::new(ScriptedFactory::new(&[])),
            PlatformKeys::default(),
            ModelConfig::default(),
        );

        let campaign = sample_campaign();
        let response = orchestrator
            .execute(turn_request(&campaign, ByokKeys::default()))
            .await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Campaign not found"));
    }
}
