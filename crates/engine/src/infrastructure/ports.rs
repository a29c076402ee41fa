//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Model provider calls (OpenAI / Anthropic / Google behind one trait)
//! - The document store (campaigns, messages, prompt config, knowledge,
//!   usage counters)
//! - Clock (for testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loreforge_domain::{
    Campaign, CampaignId, DailyUsage, DocumentId, StoredMessage, TokenUsage, UsageCounters,
    WorldModule,
};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}

/// Model-provider failure, cloneable so retry wrappers and tests can
/// replay it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Provider request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Provider call timed out after {0}s")]
    Timeout(u64),
}

// =============================================================================
// Model Provider Port
// =============================================================================

/// Role of a message sender in provider conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// A message in the conversation handed to a provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Normalized request shape across all three provider transports.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// System prompt / context.
    pub system_prompt: Option<String>,
    /// Conversation history, oldest first, ending with the user turn.
    pub messages: Vec<ChatMessage>,
    /// Temperature for response generation (0.0 - 2.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// JSON schema for structured output. Schema-aware providers pass it
    /// on the wire; the rest are instructed via prompt text and callers
    /// strip markdown fences before parsing.
    pub output_schema: Option<serde_json::Value>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// Normalized response shape.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

// =============================================================================
// Prompt Configuration Types
// =============================================================================

/// Optional per-stage prompt overrides, as stored in one configuration
/// document (global or per world). `None` means "fall through to the
/// next tier" - an explicitly null field is not a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOverrides {
    #[serde(default)]
    pub brain_prompt: Option<String>,
    #[serde(default)]
    pub voice_prompt: Option<String>,
    #[serde(default)]
    pub reviewer_prompt: Option<String>,
    /// Free-form house rules appended to the brain and voice prompts.
    #[serde(default)]
    pub custom_rules: Option<String>,
}

/// State-reviewer gate settings, global-only.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerSettings {
    pub enabled: bool,
    /// Run every Nth turn. Guarded against zero at the read site.
    pub frequency: u64,
    pub model: String,
}

impl Default for ReviewerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: 3,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// The global prompt configuration document.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPromptConfig {
    #[serde(flatten)]
    pub overrides: PromptOverrides,
    #[serde(default)]
    pub reviewer: ReviewerSettings,
}

// =============================================================================
// Knowledge Base Types
// =============================================================================

/// A knowledge-base document (lore/rules) consumed read-only by the
/// pipeline. `world_module` is a module wire name or `"global"`;
/// `target_model` is `"brain"`, `"voice"`, `"both"`, or unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDoc {
    pub id: DocumentId,
    pub name: String,
    pub world_module: String,
    pub category: String,
    pub content: String,
    pub target_model: Option<String>,
    pub enabled: bool,
}

// =============================================================================
// Document Store Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepo: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, RepoError>;
    /// Insert or replace the campaign document.
    async fn save(&self, campaign: &Campaign) -> Result<(), RepoError>;
    /// Delete the campaign, cascading to its messages.
    async fn delete(&self, id: CampaignId) -> Result<(), RepoError>;

    /// Append to the campaign's message log. Insertion order is
    /// narrative order.
    async fn append_message(&self, message: &StoredMessage) -> Result<(), RepoError>;
    /// Messages in insertion order, oldest first.
    async fn list_messages(
        &self,
        campaign_id: CampaignId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptConfigRepo: Send + Sync {
    async fn get_global(&self) -> Result<Option<GlobalPromptConfig>, RepoError>;
    async fn get_world(&self, world: WorldModule) -> Result<Option<PromptOverrides>, RepoError>;
    async fn save_global(&self, config: &GlobalPromptConfig) -> Result<(), RepoError>;
    async fn save_world(
        &self,
        world: WorldModule,
        overrides: &PromptOverrides,
    ) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeRepo: Send + Sync {
    /// All enabled documents. Module/audience filtering happens in the
    /// retriever so its rules stay in one place.
    async fn list_enabled(&self) -> Result<Vec<KnowledgeDoc>, RepoError>;
    async fn save(&self, doc: &KnowledgeDoc) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Atomically increment the user's counters and the global daily
    /// aggregate for one completed turn.
    async fn record_turn(&self, user_id: &str, usage: TokenUsage) -> Result<(), RepoError>;
    async fn get_user(&self, user_id: &str) -> Result<UsageCounters, RepoError>;
    async fn get_daily(&self, date: &str) -> Result<Option<DailyUsage>, RepoError>;
}

// =============================================================================
// Testability Ports
// =============================================================================

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
