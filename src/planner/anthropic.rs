//! Planning tier backed by a Claude Sonnet-class model

use crate::anthropic::AnthropicClient;
use crate::config::SoulConfig;
use crate::planner::PlanningResponder;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ClaudePlanner {
    client: Arc<AnthropicClient>,
    model: String,
    max_tokens: u32,
}

impl ClaudePlanner {
    pub fn new(client: Arc<AnthropicClient>, config: &SoulConfig) -> Self {
        Self {
            client,
            model: config.planning_model.clone(),
            max_tokens: config.planning_max_tokens,
        }
    }
}

#[async_trait]
impl PlanningResponder for ClaudePlanner {
    async fn plan(&self, utterance: &str, system_prompt: &str) -> crate::Result<String> {
        self.client
            .complete(&self.model, self.max_tokens, system_prompt, &[], utterance)
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
