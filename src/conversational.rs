//! Quick-tier responder
//!
//! Fast, low-cost conversational replies and one-sentence acknowledgments.
//! Failures are returned to the caller; each orchestration path decides
//! whether to surface, drop, or substitute them.

use crate::anthropic::AnthropicClient;
use crate::config::SoulConfig;
use crate::error::SoulError;
use crate::memory::ConversationTurn;
use crate::planner::PlanningResponder;
use crate::prompt::SUMMARY_PROMPT;
use async_trait::async_trait;
use std::sync::Arc;

const ACKNOWLEDGE_MAX_TOKENS: u32 = 256;
const SUMMARY_MAX_TOKENS: u32 = 128;

/// Trait for the quick tier
#[async_trait]
pub trait QuickResponder: Send + Sync {
    async fn respond(
        &self,
        utterance: &str,
        system_prompt: &str,
        history: &[ConversationTurn],
    ) -> crate::Result<String>;

    async fn acknowledge(&self, utterance: &str, system_prompt: &str) -> crate::Result<String>;

    /// Summarize a finished conversation transcript in 1-2 sentences
    async fn summarize(&self, transcript: &[ConversationTurn]) -> crate::Result<String>;

    fn model_name(&self) -> &str;
}

/// Quick tier backed by a Claude Haiku-class model
pub struct ClaudeQuickResponder {
    client: Arc<AnthropicClient>,
    model: String,
    max_tokens: u32,
}

impl ClaudeQuickResponder {
    pub fn new(client: Arc<AnthropicClient>, config: &SoulConfig) -> Self {
        Self {
            client,
            model: config.quick_model.clone(),
            max_tokens: config.quick_max_tokens,
        }
    }
}

#[async_trait]
impl QuickResponder for ClaudeQuickResponder {
    async fn respond(
        &self,
        utterance: &str,
        system_prompt: &str,
        history: &[ConversationTurn],
    ) -> crate::Result<String> {
        self.client
            .complete(&self.model, self.max_tokens, system_prompt, history, utterance)
            .await
    }

    async fn acknowledge(&self, utterance: &str, system_prompt: &str) -> crate::Result<String> {
        self.client
            .complete(&self.model, ACKNOWLEDGE_MAX_TOKENS, system_prompt, &[], utterance)
            .await
    }

    async fn summarize(&self, transcript: &[ConversationTurn]) -> crate::Result<String> {
        if transcript.is_empty() {
            return Err(SoulError::Memory("cannot summarize an empty conversation".to_string()));
        }

        let text = transcript
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        self.client
            .complete(&self.model, SUMMARY_MAX_TOKENS, SUMMARY_PROMPT, &[], &text)
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Stand-in for both tiers when no backend is configured. Every call fails
/// with [`SoulError::LlmUnavailable`], which exercises the degradation paths.
pub struct OfflineResponder {
    reason: String,
}

impl OfflineResponder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable<T>(&self) -> crate::Result<T> {
        Err(SoulError::LlmUnavailable(self.reason.clone()))
    }
}

#[async_trait]
impl QuickResponder for OfflineResponder {
    async fn respond(&self, _: &str, _: &str, _: &[ConversationTurn]) -> crate::Result<String> {
        self.unavailable()
    }

    async fn acknowledge(&self, _: &str, _: &str) -> crate::Result<String> {
        self.unavailable()
    }

    async fn summarize(&self, _: &[ConversationTurn]) -> crate::Result<String> {
        self.unavailable()
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}

#[async_trait]
impl PlanningResponder for OfflineResponder {
    async fn plan(&self, _: &str, _: &str) -> crate::Result<String> {
        self.unavailable()
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}
