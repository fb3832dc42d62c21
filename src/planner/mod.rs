//! Planning tier and plan-output parsing
//!
//! The planning tier turns a request into raw text expected to hold a JSON
//! action plan. Whatever comes back (or fails to), callers get an
//! [`ActionPlan`]: transport errors and malformed output both collapse into
//! the speak-only fallback.

use crate::models::ActionPlan;
use async_trait::async_trait;
use tracing::{debug, warn};

pub mod anthropic;
pub mod parser;

pub use anthropic::ClaudePlanner;
pub use parser::{parse_plan_response, plan_from_response, FALLBACK_PLAN_TEXT};

/// Trait for the planning tier (LLM controlled)
#[async_trait]
pub trait PlanningResponder: Send + Sync {
    /// Raw model output for a request, parsed by [`parser`]
    async fn plan(&self, utterance: &str, system_prompt: &str) -> crate::Result<String>;

    fn model_name(&self) -> &str;
}

/// Call the planning tier and always come back with a plan.
pub async fn plan_with_fallback(
    planner: &dyn PlanningResponder,
    utterance: &str,
    system_prompt: &str,
) -> ActionPlan {
    match planner.plan(utterance, system_prompt).await {
        Ok(raw) => {
            let plan = plan_from_response(&raw);
            debug!(
                actions = plan.len(),
                reasoning = %plan.reasoning,
                "Planning tier produced plan"
            );
            plan
        }
        Err(e) => {
            warn!(error = %e, "Planning tier failed, falling back to speak-only plan");
            ActionPlan::speak_only(FALLBACK_PLAN_TEXT)
        }
    }
}

/// Fixed-response planner for development & testing.
/// Keeps the system functional without a planning backend.
pub struct StaticPlanner {
    response: String,
}

impl StaticPlanner {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl PlanningResponder for StaticPlanner {
    async fn plan(&self, _utterance: &str, _system_prompt: &str) -> crate::Result<String> {
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversational::OfflineResponder;
    use crate::models::ActionType;

    #[tokio::test]
    async fn test_static_planner_plan_is_parsed() {
        let planner = StaticPlanner::new(
            r#"{"actions":[{"action_type":"navigate","parameters":{"destination":"garden"}},{"action_type":"speak","parameters":{"text":"On my way"},"depends_on":[0]}],"reasoning":"walk"}"#,
        );

        let plan = plan_with_fallback(&planner, "take me outside", "system").await;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions[0].action_type(), Some(ActionType::Navigate));
        assert_eq!(plan.actions[1].depends_on, vec![0]);
        assert_eq!(plan.first_spoken_text(), Some("On my way"));
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let planner = OfflineResponder::new("down");
        let plan = plan_with_fallback(&planner, "organize a party", "system").await;
        assert_eq!(plan, ActionPlan::speak_only(FALLBACK_PLAN_TEXT));
    }
}
