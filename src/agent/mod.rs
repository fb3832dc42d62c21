//! Orchestrator ("brain") - picks a response tier per utterance
//!
//! UTTERANCE → CLASSIFY → TIER → PLAN
//!
//! - Emergency: fixed alert plan built before any network call
//! - Simple intents: one quick-tier reply, spoken as-is
//! - Deep intents: optional interim acknowledgment, then a planning-tier plan

pub mod session;

pub use session::{Collaborators, CompanionSession, InteractionReport};

use crate::classifier::IntentRouter;
use crate::config::SoulConfig;
use crate::conversational::QuickResponder;
use crate::memory::{
    summaries_block, ConversationLog, ConversationTurn, FacilityMap, ResidentDirectory,
    SUMMARY_LIMIT,
};
use crate::models::{
    Action, ActionKind, ActionPlan, Intent, IntentCategory, InteractionResult, ModelTier,
};
use crate::planner::{plan_with_fallback, PlanningResponder};
use crate::prompt::{self, PromptContext};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const EMERGENCY_SPOKEN_TEXT: &str =
    "I'm alerting the staff right away. Stay calm, help is on the way.";
pub const EMERGENCY_FALLBACK_RESPONSE: &str = "I'm getting help right away. Please stay calm.";
pub const EMERGENCY_REASONING: &str = "Emergency detected, alerting staff immediately.";
/// Response text when a plan carries nothing to say
pub const DEEP_FALLBACK_RESPONSE: &str = "I'll help you with that.";

/// Tier routing for one intent category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Emergency,
    Simple,
    Deep,
}

impl Route {
    pub fn for_category(category: IntentCategory) -> Self {
        match category {
            IntentCategory::Emergency => Route::Emergency,
            IntentCategory::Greeting
            | IntentCategory::Farewell
            | IntentCategory::SimpleChat
            | IntentCategory::Preference
            | IntentCategory::Information => Route::Simple,
            IntentCategory::ComplexPlan
            | IntentCategory::RequestHelp
            | IntentCategory::RequestNavigate
            | IntentCategory::RequestItem => Route::Deep,
        }
    }
}

/// Fixed emergency plan: alert staff, then reassure. Both at priority 1.
pub fn emergency_plan(intent: &Intent, resident_id: Option<&str>) -> ActionPlan {
    let trigger = intent.entity("trigger").unwrap_or("unknown");

    let alert = Action::new(ActionKind::AlertStaff {
        urgency: "critical".to_string(),
        reason: format!("Emergency detected: {}", trigger),
        message: None,
        resident_id: Some(resident_id.unwrap_or("unknown").to_string()),
        utterance: Some(intent.raw_text.clone()),
    })
    .with_priority(1);

    let reassure = Action::new(ActionKind::speak(EMERGENCY_SPOKEN_TEXT)).with_priority(1);

    ActionPlan::new(vec![alert, reassure], EMERGENCY_REASONING)
}

/// The companion's cognition: classification plus tiered responses
pub struct Brain {
    quick: Arc<dyn QuickResponder>,
    planner: Arc<dyn PlanningResponder>,
    residents: Arc<dyn ResidentDirectory>,
    facility: Arc<dyn FacilityMap>,
    conversations: Option<Arc<dyn ConversationLog>>,
    robot_name: String,
    facility_name: String,
    interim_response: bool,
}

impl Brain {
    pub fn new(
        config: &SoulConfig,
        quick: Arc<dyn QuickResponder>,
        planner: Arc<dyn PlanningResponder>,
        residents: Arc<dyn ResidentDirectory>,
        facility: Arc<dyn FacilityMap>,
    ) -> Self {
        Self {
            quick,
            planner,
            residents,
            facility,
            conversations: None,
            robot_name: config.robot_name.clone(),
            facility_name: config.facility_name.clone(),
            interim_response: config.interim_response,
        }
    }

    /// Source of past conversation summaries for the quick-tier prompt
    pub fn with_conversation_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.conversations = Some(log);
        self
    }

    /// Process one utterance.
    ///
    /// Only a quick-tier failure on the simple path is returned as `Err`;
    /// every other backend failure degrades to a safe default.
    pub async fn process(
        &self,
        text: &str,
        resident_id: Option<&str>,
        history: &[ConversationTurn],
    ) -> Result<InteractionResult> {
        let intent = IntentRouter::classify(text);
        info!(
            intent = %intent.category,
            confidence = intent.confidence,
            "Intent classified"
        );

        match Route::for_category(intent.category) {
            Route::Emergency => Ok(self.handle_emergency(intent, resident_id).await),
            Route::Simple => self.handle_simple(intent, resident_id, history).await,
            Route::Deep => Ok(self.handle_deep(intent, resident_id).await),
        }
    }

    async fn handle_emergency(&self, intent: Intent, resident_id: Option<&str>) -> InteractionResult {
        let action_plan = emergency_plan(&intent, resident_id);
        warn!(
            trigger = intent.entity("trigger").unwrap_or("unknown"),
            resident_id = resident_id.unwrap_or("unknown"),
            "Emergency plan built"
        );

        let ctx = PromptContext {
            resident_context: self.resident_context(resident_id).await,
            ..self.base_context()
        };

        let response_text = match self
            .quick
            .acknowledge(&intent.raw_text, &prompt::acknowledge_prompt(&ctx))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => EMERGENCY_FALLBACK_RESPONSE.to_string(),
            Err(e) => {
                error!(error = %e, "Quick tier failed during emergency acknowledgment");
                EMERGENCY_FALLBACK_RESPONSE.to_string()
            }
        };

        InteractionResult {
            intent,
            response_text,
            action_plan,
            resident_id: resident_id.map(str::to_string),
            model_tier: ModelTier::Quick,
            model_used: self.quick.model_name().to_string(),
            interim_response: None,
        }
    }

    async fn handle_simple(
        &self,
        intent: Intent,
        resident_id: Option<&str>,
        history: &[ConversationTurn],
    ) -> Result<InteractionResult> {
        let ctx = PromptContext {
            resident_context: self.resident_context(resident_id).await,
            facility_context: self.facility_context().await,
            conversation_summaries: self.conversation_summaries(resident_id).await,
            ..self.base_context()
        };

        let response_text = self
            .quick
            .respond(&intent.raw_text, &prompt::quick_prompt(&ctx), history)
            .await?;

        debug!(chars = response_text.len(), "Quick tier responded");

        Ok(InteractionResult {
            action_plan: ActionPlan::speak_only(response_text.clone()),
            intent,
            response_text,
            resident_id: resident_id.map(str::to_string),
            model_tier: ModelTier::Quick,
            model_used: self.quick.model_name().to_string(),
            interim_response: None,
        })
    }

    async fn handle_deep(&self, intent: Intent, resident_id: Option<&str>) -> InteractionResult {
        let ctx = PromptContext {
            resident_context: self.resident_context(resident_id).await,
            facility_context: self.facility_context().await,
            ..self.base_context()
        };

        let mut interim_response = None;
        if self.interim_response {
            match self
                .quick
                .acknowledge(&intent.raw_text, &prompt::acknowledge_prompt(&ctx))
                .await
            {
                Ok(text) => interim_response = Some(text),
                Err(e) => warn!(error = %e, "Interim acknowledgment failed, continuing with planning tier"),
            }
        }

        let action_plan = plan_with_fallback(
            self.planner.as_ref(),
            &intent.raw_text,
            &prompt::planning_prompt(&ctx),
        )
        .await;

        let response_text = action_plan
            .first_spoken_text()
            .unwrap_or(DEEP_FALLBACK_RESPONSE)
            .to_string();

        InteractionResult {
            intent,
            response_text,
            action_plan,
            resident_id: resident_id.map(str::to_string),
            model_tier: ModelTier::Deep,
            model_used: self.planner.model_name().to_string(),
            interim_response,
        }
    }

    //
    // ---------- context builders (failures degrade to empty text) ----------
    //

    fn base_context(&self) -> PromptContext {
        PromptContext {
            robot_name: self.robot_name.clone(),
            facility_name: self.facility_name.clone(),
            current_time: prompt::current_time(),
            ..Default::default()
        }
    }

    async fn resident_context(&self, resident_id: Option<&str>) -> String {
        let Some(resident_id) = resident_id else {
            return String::new();
        };
        self.residents
            .context_block(resident_id)
            .await
            .unwrap_or_else(|e| {
                warn!(resident_id, error = %e, "Failed to build resident context");
                String::new()
            })
    }

    async fn facility_context(&self) -> String {
        self.facility.context_block().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build facility context");
            String::new()
        })
    }

    async fn conversation_summaries(&self, resident_id: Option<&str>) -> String {
        let (Some(log), Some(resident_id)) = (&self.conversations, resident_id) else {
            return String::new();
        };
        match log.recent_summaries(resident_id, SUMMARY_LIMIT).await {
            Ok(summaries) => summaries_block(&summaries),
            Err(e) => {
                warn!(resident_id, error = %e, "Failed to load conversation summaries");
                String::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::conversational::QuickResponder;
    use crate::error::SoulError;
    use crate::memory::ConversationTurn;
    use crate::planner::PlanningResponder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Quick tier with scripted replies and call counters
    pub struct MockQuick {
        pub reply: Option<String>,
        pub ack: Option<String>,
        pub respond_calls: AtomicUsize,
        pub ack_calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
        pub history_lens: Mutex<Vec<usize>>,
    }

    impl MockQuick {
        pub fn new(reply: Option<&str>, ack: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                ack: ack.map(str::to_string),
                respond_calls: AtomicUsize::new(0),
                ack_calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                history_lens: Mutex::new(Vec::new()),
            }
        }

        pub fn offline() -> Self {
            Self::new(None, None)
        }

        fn scripted(value: &Option<String>) -> crate::Result<String> {
            value
                .clone()
                .ok_or_else(|| SoulError::LlmUnavailable("scripted outage".to_string()))
        }
    }

    #[async_trait]
    impl QuickResponder for MockQuick {
        async fn respond(
            &self,
            _utterance: &str,
            system_prompt: &str,
            history: &[ConversationTurn],
        ) -> crate::Result<String> {
            self.respond_calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            self.history_lens.lock().unwrap().push(history.len());
            Self::scripted(&self.reply)
        }

        async fn acknowledge(&self, _utterance: &str, _system_prompt: &str) -> crate::Result<String> {
            self.ack_calls.fetch_add(1, Ordering::SeqCst);
            Self::scripted(&self.ack)
        }

        async fn summarize(&self, transcript: &[ConversationTurn]) -> crate::Result<String> {
            match &self.reply {
                Some(_) => Ok(format!("Talked for {} turns.", transcript.len())),
                None => Err(SoulError::LlmUnavailable("scripted outage".to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "mock-quick"
        }
    }

    /// Planning tier returning a scripted raw response
    pub struct MockPlanner {
        pub raw: Option<String>,
        pub calls: AtomicUsize,
    }

    impl MockPlanner {
        pub fn new(raw: Option<&str>) -> Self {
            Self {
                raw: raw.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlanningResponder for MockPlanner {
        async fn plan(&self, _utterance: &str, _system_prompt: &str) -> crate::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.raw
                .clone()
                .ok_or_else(|| SoulError::LlmUnavailable("scripted outage".to_string()))
        }

        fn model_name(&self) -> &str {
            "mock-planner"
        }
    }
}
