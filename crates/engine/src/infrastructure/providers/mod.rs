//! Model provider adapters.
//!
//! Three incompatible transports normalized behind [`LlmPort`]:
//! chat-completion style (OpenAI), messages-with-system style (Anthropic),
//! and contents-with-systemInstruction style (Google). Each adapter owns
//! its history-shape adaptation and structured-output strategy; everything
//! upstream sees one request/response shape.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use std::sync::Arc;

use crate::infrastructure::ports::LlmPort;

/// Provider request timeout. A hung provider call must not block a turn
/// indefinitely; timeouts feed the same fallback paths as any provider
/// failure.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// The three supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    /// Pick a provider from a model name prefix. Used by the state
    /// reviewer, whose model is free-form configuration.
    pub fn for_model(model: &str) -> ProviderKind {
        let model = model.trim().to_lowercase();
        if model.starts_with("claude") {
            Self::Anthropic
        } else if model.starts_with("gemini") {
            Self::Google
        } else {
            Self::OpenAi
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a client for one provider with one key and model. Clients are
/// cheap to construct, so BYOK requests simply build fresh ones.
pub fn build_client(kind: ProviderKind, api_key: &str, model: &str) -> Arc<dyn LlmPort> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(api_key, model)),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(api_key, model)),
        ProviderKind::Google => Arc::new(GeminiClient::new(api_key, model)),
    }
}

/// Instruction appended for providers without wire-level structured
/// output. Callers still strip markdown fences before parsing.
pub(crate) fn raw_json_instruction(schema: &serde_json::Value) -> String {
    format!(
        "Respond with a single raw JSON object and nothing else. \
         No markdown fences, no commentary. The object must match this \
         JSON schema:\n{schema}"
    )
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout_secs: u64) -> super::ports::LlmError {
    if err.is_timeout() {
        super::ports::LlmError::Timeout(timeout_secs)
    } else {
        super::ports::LlmError::RequestFailed(err.to_string())
    }
}
