//! Anthropic Messages API client shared by both model tiers
//!
//! Built once by [`AnthropicClient::connect`] at startup and shared behind an
//! `Arc`; the underlying `reqwest::Client` pools connections.

use crate::config::SoulConfig;
use crate::error::SoulError;
use crate::memory::{ConversationTurn, TurnRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const API_VERSION: &str = "2023-06-01";

/// Reusable Anthropic client (connection-pooled)
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Build the shared HTTP client. Fails when no API key is configured so
    /// that the problem surfaces at startup instead of on the first utterance.
    pub fn connect(config: &SoulConfig) -> crate::Result<Self> {
        if !config.has_api_key() {
            return Err(SoulError::Config(
                "ANTHROPIC_API_KEY (or SOUL_ANTHROPIC_API_KEY) not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send one Messages request and return the first text block.
    pub async fn complete(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        history: &[ConversationTurn],
        utterance: &str,
    ) -> crate::Result<String> {
        let mut messages: Vec<ApiMessage> = history
            .iter()
            .map(|turn| ApiMessage {
                role: role_name(turn.role),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(ApiMessage {
            role: "user",
            content: utterance.to_string(),
        });

        let request = MessagesRequest {
            model: model.to_string(),
            max_tokens,
            system: vec![SystemBlock::cached(system)],
            messages,
        };

        debug!(model, turns = request.messages.len(), "Calling Anthropic API");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Anthropic API request failed: {}", e);
                SoulError::LlmUnavailable(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| format!("{}: {}", e.error.kind, e.error.message))
                .unwrap_or_else(|_| truncate(&body, 300));
            error!(%status, "Anthropic API error response: {}", detail);
            return Err(SoulError::Llm(format!("{} ({})", detail, status)));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Anthropic response: {}", e);
            SoulError::Llm(format!("response parse error: {}", e))
        })?;

        first_text(&parsed)
            .ok_or_else(|| SoulError::Llm("response contained no text block".to_string()))
    }
}

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
    }
}

fn first_text(response: &MessagesResponse) -> Option<String> {
    response.content.iter().find_map(|block| match block {
        ContentBlock::Text { text } => Some(text.clone()),
        ContentBlock::Other => None,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...(truncated)", cut)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: Vec<SystemBlock>,
    messages: Vec<ApiMessage>,
}

/// System prompt block marked for ephemeral prompt caching
#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    cache_control: CacheControl,
}

impl SystemBlock {
    fn cached(text: &str) -> Self {
        Self {
            kind: "text",
            text: text.to_string(),
            cache_control: CacheControl { kind: "ephemeral" },
        }
    }
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
