//! Anthropic messages adapter.
//!
//! Anthropic takes the system prompt as a top-level field and requires
//! the message list to start with a user turn; leading non-user turns are
//! stripped rather than erroring. No wire-level structured output: a
//! request's schema becomes a raw-JSON prompt instruction and callers
//! strip markdown fences before parsing.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{ChatRole, LlmError, LlmPort, LlmRequest, LlmResponse};
use crate::infrastructure::providers::{
    map_reqwest_error, raw_json_instruction, DEFAULT_TIMEOUT_SECS,
};
use loreforge_domain::TokenUsage;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic requires max_tokens; this is the cap when the caller does
/// not set one.
const FALLBACK_MAX_TOKENS: u32 = 2048;

#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[async_trait]
impl LlmPort for AnthropicClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let system = build_system(&request);

        let api_request = MessagesRequest {
            model: self.model.clone(),
            system,
            messages: build_messages(&request),
            max_tokens: request.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status}: {error_text}")));
        }

        let api_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        convert_response(api_response)
    }
}

fn build_system(request: &LlmRequest) -> Option<String> {
    match (&request.system_prompt, &request.output_schema) {
        (Some(system), Some(schema)) => {
            Some(format!("{system}\n\n{}", raw_json_instruction(schema)))
        }
        (Some(system), None) => Some(system.clone()),
        (None, Some(schema)) => Some(raw_json_instruction(schema)),
        (None, None) => None,
    }
}

/// Drop leading non-user turns so the conversation starts with `user`,
/// then fold any in-conversation system turns into user turns (the API
/// accepts only user/assistant roles).
fn build_messages(request: &LlmRequest) -> Vec<ApiMessage> {
    request
        .messages
        .iter()
        .skip_while(|m| m.role != ChatRole::User)
        .map(|m| ApiMessage {
            role: match m.role {
                ChatRole::Assistant => "assistant",
                ChatRole::User | ChatRole::System => "user",
            }
            .to_string(),
            content: m.content.clone(),
        })
        .collect()
}

fn convert_response(response: MessagesResponse) -> Result<LlmResponse, LlmError> {
    let content = response
        .content
        .into_iter()
        .filter(|block| block.r#type == "text")
        .map(|block| block.text.unwrap_or_default())
        .collect::<Vec<_>>()
        .join("");

    if content.is_empty() {
        return Err(LlmError::InvalidResponse(
            "No text blocks in response".to_string(),
        ));
    }

    Ok(LlmResponse {
        content,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }),
    })
}

// =============================================================================
// Anthropic API types
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}
