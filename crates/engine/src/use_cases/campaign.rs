//! Campaign lifecycle: creation with an opening narrative, read-back,
//! and delete.

use std::sync::Arc;

use crate::infrastructure::ports::{CampaignRepo, ClockPort, RepoError};
use crate::infrastructure::providers::ProviderKind;
use crate::use_cases::knowledge::{docs_for_budget, Audience, KnowledgeRetriever};
use crate::use_cases::prompts::PromptResolver;
use crate::use_cases::turn::{LlmFactory, ModelConfig, PlatformKeys};
use crate::use_cases::voice::{VoiceEngine, VoiceInput};
use loreforge_domain::{Campaign, CampaignId, MessageRole, StoredMessage};
use loreforge_shared::{ByokKeys, CampaignCreateRequest, CampaignCreateResponse};

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for CampaignError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            other => Self::Storage(other.to_string()),
        }
    }
}

pub struct CampaignService {
    campaigns: Arc<dyn CampaignRepo>,
    prompts: Arc<PromptResolver>,
    knowledge: Arc<KnowledgeRetriever>,
    clock: Arc<dyn ClockPort>,
    factory: Arc<dyn LlmFactory>,
    platform_keys: PlatformKeys,
    models: ModelConfig,
}

impl CampaignService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignRepo>,
        prompts: Arc<PromptResolver>,
        knowledge: Arc<KnowledgeRetriever>,
        clock: Arc<dyn ClockPort>,
        factory: Arc<dyn LlmFactory>,
        platform_keys: PlatformKeys,
        models: ModelConfig,
    ) -> Self {
        Self {
            campaigns,
            prompts,
            knowledge,
            clock,
            factory,
            platform_keys,
            models,
        }
    }

    /// Create a campaign and its opening narration. Narrator failures
    /// (or a missing key) fall back to the world's hardcoded opener;
    /// creation never fails on the narrator's account.
    pub async fn create(
        &self,
        request: CampaignCreateRequest,
    ) -> Result<CampaignCreateResponse, CampaignError> {
        let now = self.clock.now();
        let character = request.initial_character.clone().unwrap_or_else(|| {
            serde_json::json!({
                "name": request.character_name.clone().unwrap_or_else(|| "Adventurer".to_string())
            })
        });

        let campaign = Campaign::new(&request.name, request.world_module, character, now);

        let narrative = self
            .opening_narrative(&campaign, request.byok_keys.as_ref())
            .await;

        self.campaigns.save(&campaign).await?;
        let opener =
            StoredMessage::new(campaign.id, MessageRole::Narrator, &narrative, now);
        self.campaigns.append_message(&opener).await?;

        Ok(CampaignCreateResponse {
            campaign_id: campaign.id.into(),
            initial_narrative: narrative,
        })
    }

    async fn opening_narrative(&self, campaign: &Campaign, byok: Option<&ByokKeys>) -> String {
        let key = byok
            .and_then(|keys| keys.anthropic.clone())
            .or_else(|| self.platform_keys.anthropic.clone());
        let Some(key) = key else {
            return campaign.world_module.fallback_opener().to_string();
        };

        let snapshot = self.prompts.snapshot(campaign.world_module).await;
        let knowledge = self
            .knowledge
            .fetch(
                campaign.world_module,
                Audience::Voice,
                docs_for_budget(self.models.knowledge_budget_tokens),
            )
            .await;

        let client =
            self.factory
                .client(ProviderKind::Anthropic, &key, &self.models.voice_model);
        let mut changes = serde_json::Map::new();
        changes.insert("campaignStart".to_string(), serde_json::json!(true));
        let opening_cue = [crate::use_cases::brain::NarrativeCue {
            cue_type: crate::use_cases::brain::CueType::Description,
            content: format!(
                "Open the campaign '{}'. Introduce the setting and the \
                 character's immediate surroundings, then invite their \
                 first action.",
                campaign.name
            ),
            emotion: None,
        }];

        match VoiceEngine::run(
            client.as_ref(),
            VoiceInput {
                world: campaign.world_module,
                state: &campaign.state,
                chat_history: &[],
                system_prompt: &snapshot.voice_prompt,
                knowledge: &knowledge,
                custom_rules: snapshot.custom_rules.as_deref(),
                cues: &opening_cue,
                dice_rolls: &[],
                state_changes: &changes,
                word_limit_min: self.models.word_limit_min,
                word_limit_max: self.models.word_limit_max,
                is_keep_alive: false,
            },
        )
        .await
        {
            Ok(result) => result.narrative,
            Err(e) => {
                tracing::warn!(error = %e, "Opening narration failed, using fallback opener");
                campaign.world_module.fallback_opener().to_string()
            }
        }
    }

    pub async fn get(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.campaigns
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    pub async fn messages(
        &self,
        id: CampaignId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, CampaignError> {
        // Read-back for client history reconstruction.
        self.get(id).await?;
        Ok(self.campaigns.list_messages(id, limit).await?)
    }

    pub async fn delete(&self, id: CampaignId) -> Result<(), CampaignError> {
        self.get(id).await?;
        Ok(self.campaigns.delete(id).await?)
    }
}
