//! Interaction session: listen → think → act → remember
//!
//! Owns the per-robot state that outlives a single utterance: the active
//! resident, the open conversation and the rolling turn history.

use crate::agent::Brain;
use crate::audit::{InteractionLog, InteractionRecord};
use crate::config::SoulConfig;
use crate::conversational::QuickResponder;
use crate::execution::Dispatcher;
use crate::memory::{
    ConversationHistory, ConversationLog, FacilityMap, PreferenceStore, ResidentDirectory,
    ResidentProfile, TurnRole,
};
use crate::models::{IntentCategory, ModelTier};
use crate::planner::PlanningResponder;
use crate::tools::{Manipulator, Navigator, Speaker};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub quick: Arc<dyn QuickResponder>,
    pub planner: Arc<dyn PlanningResponder>,
    pub speaker: Arc<dyn Speaker>,
    pub navigator: Arc<dyn Navigator>,
    pub manipulator: Arc<dyn Manipulator>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub residents: Arc<dyn ResidentDirectory>,
    pub facility: Arc<dyn FacilityMap>,
    pub conversations: Arc<dyn ConversationLog>,
}

/// Outcome of one processed utterance
#[derive(Debug, Clone, Serialize)]
pub struct InteractionReport {
    pub interaction_id: Uuid,
    pub response_text: String,
    pub intent: IntentCategory,
    pub model_tier: ModelTier,
    pub model_used: String,
    pub actions_executed: usize,
    pub actions_succeeded: usize,
    pub think_ms: u64,
    pub act_ms: u64,
}

pub struct CompanionSession {
    brain: Brain,
    dispatcher: Dispatcher,
    quick: Arc<dyn QuickResponder>,
    residents: Arc<dyn ResidentDirectory>,
    conversations: Arc<dyn ConversationLog>,
    interactions: Arc<InteractionLog>,
    history: ConversationHistory,
    resident_id: Option<String>,
    conversation_id: Option<Uuid>,
}

impl CompanionSession {
    pub fn new(config: &SoulConfig, parts: Collaborators) -> Self {
        let brain = Brain::new(
            config,
            parts.quick.clone(),
            parts.planner,
            parts.residents.clone(),
            parts.facility,
        )
        .with_conversation_log(parts.conversations.clone());

        let dispatcher = Dispatcher::new(
            parts.speaker,
            parts.navigator,
            parts.manipulator,
            parts.preferences,
        );

        Self {
            brain,
            dispatcher,
            quick: parts.quick,
            residents: parts.residents,
            conversations: parts.conversations,
            interactions: Arc::new(InteractionLog::new()),
            history: ConversationHistory::new(config.history_turns),
            resident_id: None,
            conversation_id: None,
        }
    }

    pub fn interactions(&self) -> Arc<InteractionLog> {
        self.interactions.clone()
    }

    pub fn resident_id(&self) -> Option<&str> {
        self.resident_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn set_resident(&mut self, resident_id: Option<String>) {
        self.dispatcher.set_resident(resident_id.clone());
        self.resident_id = resident_id;
        self.history.clear();
    }

    pub async fn find_resident(&self, name: &str) -> Result<Option<ResidentProfile>> {
        self.residents.find_by_name(name).await
    }

    /// Begin a conversation, ending any open one first.
    pub async fn start_conversation(&mut self, resident_id: Option<String>) -> Result<Uuid> {
        if self.conversation_id.is_some() {
            self.end_conversation().await?;
        }
        if resident_id.is_some() {
            self.set_resident(resident_id);
        }

        let id = self.conversations.start(self.resident_id.as_deref()).await?;
        self.conversation_id = Some(id);
        info!(conversation_id = %id, resident_id = ?self.resident_id, "Conversation started");
        Ok(id)
    }

    /// End the open conversation, summarising it with the quick tier.
    /// Returns the stored summary, if one was produced.
    pub async fn end_conversation(&mut self) -> Result<Option<String>> {
        let Some(id) = self.conversation_id.take() else {
            return Ok(None);
        };

        let transcript = self.conversations.transcript(id).await?;
        let summary = if transcript.is_empty() {
            None
        } else {
            match self.quick.summarize(&transcript).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(conversation_id = %id, error = %e, "Conversation summary failed");
                    None
                }
            }
        };

        self.conversations.end(id, summary.clone()).await?;
        self.history.clear();
        info!(conversation_id = %id, summarised = summary.is_some(), "Conversation ended");
        Ok(summary)
    }

    /// Run one utterance through the full pipeline.
    pub async fn process_text(&mut self, text: &str) -> Result<InteractionReport> {
        let think_start = Instant::now();
        let result = self
            .brain
            .process(text, self.resident_id.as_deref(), &self.history.turns())
            .await?;
        let think_ms = think_start.elapsed().as_millis() as u64;

        info!(
            intent = %result.intent.category,
            model = %result.model_used,
            think_ms,
            "Brain processed utterance"
        );

        if let Some(interim) = &result.interim_response {
            self.dispatcher.speak(interim).await;
        }

        let act_start = Instant::now();
        let results = self.dispatcher.execute(&result.action_plan).await;
        let act_ms = act_start.elapsed().as_millis() as u64;
        info!(actions = results.len(), act_ms, "Actions executed");

        self.history.record_exchange(text, &result.response_text);

        if let Some(id) = self.conversation_id {
            for (role, content) in [
                (TurnRole::User, text),
                (TurnRole::Assistant, result.response_text.as_str()),
            ] {
                if let Err(e) = self.conversations.append(id, role, content).await {
                    warn!(conversation_id = %id, error = %e, "Failed to log conversation turn");
                }
            }
        }

        let actions_executed = results.len();
        let actions_succeeded = results.iter().filter(|r| r.success).count();

        let record = InteractionRecord::new(
            self.resident_id.clone(),
            result.intent.category,
            text,
            &result.response_text,
            &result.model_used,
            result.action_plan.clone(),
            results,
        );
        let interaction_id = self.interactions.record(record).await?;

        Ok(InteractionReport {
            interaction_id,
            response_text: result.response_text,
            intent: result.intent.category,
            model_tier: result.model_tier,
            model_used: result.model_used,
            actions_executed,
            actions_succeeded,
            think_ms,
            act_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{MockPlanner, MockQuick};
    use crate::agent::EMERGENCY_SPOKEN_TEXT;
    use crate::memory::{
        InMemoryConversationLog, InMemoryPreferenceStore, InMemoryResidents, StaticFacility,
    };
    use crate::tools::PolicyActuator;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSpeaker {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Speaker for RecordingSpeaker {
        async fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }
    }

    struct Fixture {
        session: CompanionSession,
        speaker: Arc<RecordingSpeaker>,
        residents: Arc<InMemoryResidents>,
        preferences: Arc<InMemoryPreferenceStore>,
        log: Arc<InMemoryConversationLog>,
    }

    fn fixture(quick: MockQuick, planner: MockPlanner) -> Fixture {
        let speaker = Arc::new(RecordingSpeaker::default());
        let actuator = Arc::new(PolicyActuator::simulated());
        let preferences = Arc::new(InMemoryPreferenceStore::new());
        let residents = Arc::new(InMemoryResidents::new().with_preferences(preferences.clone()));
        let log = Arc::new(InMemoryConversationLog::new());

        let session = CompanionSession::new(
            &SoulConfig::default(),
            Collaborators {
                quick: Arc::new(quick),
                planner: Arc::new(planner),
                speaker: speaker.clone(),
                navigator: actuator.clone(),
                manipulator: actuator,
                preferences: preferences.clone(),
                residents: residents.clone(),
                facility: Arc::new(StaticFacility::new()),
                conversations: log.clone(),
            },
        );

        Fixture {
            session,
            speaker,
            residents,
            preferences,
            log,
        }
    }

    #[tokio::test]
    async fn test_emergency_executes_alert_under_outage() {
        let mut f = fixture(MockQuick::offline(), MockPlanner::new(None));

        let report = f.session.process_text("Help! I've fallen").await.unwrap();
        assert_eq!(report.intent, IntentCategory::Emergency);
        assert_eq!(report.actions_executed, 2);
        assert_eq!(report.actions_succeeded, 2);

        let spoken = f.speaker.spoken.lock().unwrap();
        assert!(spoken[0].starts_with("Alert: Emergency detected: "));
        assert_eq!(spoken[1], EMERGENCY_SPOKEN_TEXT);
    }

    #[tokio::test]
    async fn test_deep_plan_is_executed_and_remembered() {
        let plan = r#"{"actions": [
            {"action_type": "speak", "parameters": {"text": "I'll remember that you love tea."}},
            {"action_type": "remember", "parameters": {"category": "drink", "key": "favorite", "value": "tea"}}
        ]}"#;
        let mut f = fixture(
            MockQuick::new(Some("ok"), Some("Let me note that.")),
            MockPlanner::new(Some(plan)),
        );
        let rid = f.residents.add("Margaret", Some("12"), None).await;
        f.session.start_conversation(Some(rid.clone())).await.unwrap();

        let report = f
            .session
            .process_text("I get confused about my tea, can you note it down")
            .await
            .unwrap();
        assert_eq!(report.model_tier, ModelTier::Deep);
        assert_eq!(report.actions_succeeded, 2);
        assert_eq!(report.response_text, "I'll remember that you love tea.");

        {
            let spoken = f.speaker.spoken.lock().unwrap();
            assert_eq!(spoken[0], "Let me note that.");
            assert_eq!(spoken[1], "I'll remember that you love tea.");
        }

        let stored = f.preferences.get(&rid, "drink", "favorite").await.unwrap();
        assert_eq!(stored.unwrap().value, "tea");

        let records = f
            .session
            .interactions()
            .recent(Some(&rid), 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(f
            .session
            .interactions()
            .verify_integrity(records[0].interaction_id)
            .await
            .unwrap());

        let summary = f.session.end_conversation().await.unwrap();
        assert_eq!(summary.as_deref(), Some("Talked for 2 turns."));
        let summaries = f.log.recent_summaries(&rid, 5).await.unwrap();
        assert_eq!(summaries.len(), 1);
    }

    #[tokio::test]
    async fn test_simple_failure_propagates() {
        let mut f = fixture(MockQuick::offline(), MockPlanner::new(None));
        assert!(f.session.process_text("Thanks a lot").await.is_err());
        assert!(f.speaker.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_without_summary_when_quick_tier_down() {
        let mut f = fixture(MockQuick::new(None, Some("ok")), MockPlanner::new(None));
        let id = f.session.start_conversation(None).await.unwrap();
        f.session.process_text("Take me to the garden").await.unwrap();

        assert_eq!(f.session.end_conversation().await.unwrap(), None);
        let conversation = f.log.get(id).await.unwrap();
        assert!(conversation.ended_at.is_some());
        assert_eq!(conversation.turns.len(), 2);
        assert!(f.session.end_conversation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_and_set_resident() {
        let mut f = fixture(MockQuick::offline(), MockPlanner::new(None));
        let rid = f.residents.add("Walter", None, None).await;

        let found = f.session.find_resident("WALTER").await.unwrap().unwrap();
        f.session.set_resident(Some(found.id));
        assert_eq!(f.session.resident_id(), Some(rid.as_str()));
    }
}
