//! Application state and composition.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::infrastructure::persistence::{
    SqliteCampaignRepo, SqliteKnowledgeRepo, SqlitePromptConfigRepo, SqliteUsageRepo,
};
use crate::infrastructure::ports::{
    CampaignRepo, ClockPort, KnowledgeRepo, PromptConfigRepo, UsageRepo,
};
use crate::use_cases::campaign::CampaignService;
use crate::use_cases::knowledge::KnowledgeRetriever;
use crate::use_cases::prompts::PromptResolver;
use crate::use_cases::turn::{
    HttpLlmFactory, LlmFactory, ModelConfig, PlatformKeys, TurnOrchestrator,
};

/// Main application state.
///
/// Holds the two entry-point use cases. Passed to HTTP handlers via
/// Axum state.
pub struct App {
    pub campaigns: Arc<CampaignService>,
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub async fn new(
        pool: SqlitePool,
        clock: Arc<dyn ClockPort>,
        platform_keys: PlatformKeys,
        models: ModelConfig,
    ) -> Result<Self, sqlx::Error> {
        let campaign_repo: Arc<dyn CampaignRepo> =
            Arc::new(SqliteCampaignRepo::new(pool.clone()).await?);
        let prompt_repo: Arc<dyn PromptConfigRepo> =
            Arc::new(SqlitePromptConfigRepo::new(pool.clone()).await?);
        let knowledge_repo: Arc<dyn KnowledgeRepo> =
            Arc::new(SqliteKnowledgeRepo::new(pool.clone()).await?);
        let usage_repo: Arc<dyn UsageRepo> =
            Arc::new(SqliteUsageRepo::new(pool, clock.clone()).await?);

        let prompts = Arc::new(PromptResolver::new(prompt_repo));
        let knowledge = Arc::new(KnowledgeRetriever::new(knowledge_repo));
        let factory: Arc<dyn LlmFactory> = Arc::new(HttpLlmFactory);

        let orchestrator = Arc::new(TurnOrchestrator::new(
            campaign_repo.clone(),
            prompts.clone(),
            knowledge.clone(),
            usage_repo.clone(),
            clock.clone(),
            factory.clone(),
            platform_keys.clone(),
            models.clone(),
        ));

        let campaigns = Arc::new(CampaignService::new(
            campaign_repo,
            prompts,
            knowledge,
            clock,
            factory,
            platform_keys,
            models,
        ));

        Ok(Self {
            campaigns,
            orchestrator,
        })
    }
}
