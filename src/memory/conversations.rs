//! Conversation log: transcripts and end-of-conversation summaries

use crate::error::SoulError;
use crate::memory::store::{ConversationTurn, TurnRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Number of past summaries injected into the quick-tier prompt
pub const SUMMARY_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub resident_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub summary: String,
}

#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn start(&self, resident_id: Option<&str>) -> crate::Result<Uuid>;

    async fn append(&self, conversation_id: Uuid, role: TurnRole, content: &str)
        -> crate::Result<()>;

    async fn end(&self, conversation_id: Uuid, summary: Option<String>) -> crate::Result<()>;

    async fn transcript(&self, conversation_id: Uuid) -> crate::Result<Vec<ConversationTurn>>;

    /// Summarised conversations of a resident, newest first
    async fn recent_summaries(
        &self,
        resident_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<ConversationSummary>>;
}

/// Prompt block listing previous conversations; empty when there are none.
pub fn summaries_block(summaries: &[ConversationSummary]) -> String {
    if summaries.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Previous conversations:".to_string()];
    lines.extend(summaries.iter().map(|s| {
        format!(
            "- [{}]: {}",
            s.started_at.format("%Y-%m-%d %H:%M"),
            s.summary
        )
    }));
    lines.join("\n")
}

#[derive(Default)]
pub struct InMemoryConversationLog {
    conversations: Arc<RwLock<HashMap<Uuid, Conversation>>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.conversations.read().await.get(&conversation_id).cloned()
    }
}

fn unknown_conversation(id: Uuid) -> SoulError {
    SoulError::Memory(format!("unknown conversation {}", id))
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn start(&self, resident_id: Option<&str>) -> crate::Result<Uuid> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            resident_id: resident_id.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
            summary: None,
            turns: Vec::new(),
        };
        let id = conversation.id;
        self.conversations.write().await.insert(id, conversation);
        Ok(id)
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        role: TurnRole,
        content: &str,
    ) -> crate::Result<()> {
        let mut locked = self.conversations.write().await;
        let conversation = locked
            .get_mut(&conversation_id)
            .ok_or_else(|| unknown_conversation(conversation_id))?;
        conversation.turns.push(ConversationTurn::new(role, content));
        Ok(())
    }

    async fn end(&self, conversation_id: Uuid, summary: Option<String>) -> crate::Result<()> {
        let mut locked = self.conversations.write().await;
        let conversation = locked
            .get_mut(&conversation_id)
            .ok_or_else(|| unknown_conversation(conversation_id))?;
        conversation.ended_at = Some(Utc::now());
        conversation.summary = summary;
        Ok(())
    }

    async fn transcript(&self, conversation_id: Uuid) -> crate::Result<Vec<ConversationTurn>> {
        self.conversations
            .read()
            .await
            .get(&conversation_id)
            .map(|c| c.turns.clone())
            .ok_or_else(|| unknown_conversation(conversation_id))
    }

    async fn recent_summaries(
        &self,
        resident_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<ConversationSummary>> {
        let locked = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = locked
            .values()
            .filter(|c| c.resident_id.as_deref() == Some(resident_id))
            .filter_map(|c| {
                c.summary.as_ref().map(|s| ConversationSummary {
                    conversation_id: c.id,
                    started_at: c.started_at,
                    summary: s.clone(),
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let log = InMemoryConversationLog::new();
        let id = log.start(Some("r1")).await.unwrap();
        log.append(id, TurnRole::User, "Good morning").await.unwrap();
        log.append(id, TurnRole::Assistant, "Good morning, Margaret!")
            .await
            .unwrap();

        let transcript = log.transcript(id).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, TurnRole::Assistant);

        log.end(id, Some("Morning greeting.".to_string())).await.unwrap();
        let conversation = log.get(id).await.unwrap();
        assert!(conversation.ended_at.is_some());

        let summaries = log.recent_summaries("r1", SUMMARY_LIMIT).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].summary, "Morning greeting.");
        assert!(log.recent_summaries("r2", SUMMARY_LIMIT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_error() {
        let log = InMemoryConversationLog::new();
        let result = log.append(Uuid::new_v4(), TurnRole::User, "hi").await;
        assert!(matches!(result, Err(SoulError::Memory(_))));
    }

    #[tokio::test]
    async fn test_recent_summaries_limit_and_block() {
        let log = InMemoryConversationLog::new();
        for i in 0..7 {
            let id = log.start(Some("r1")).await.unwrap();
            log.end(id, Some(format!("chat {}", i))).await.unwrap();
        }
        let unsummarised = log.start(Some("r1")).await.unwrap();
        log.end(unsummarised, None).await.unwrap();

        let summaries = log.recent_summaries("r1", SUMMARY_LIMIT).await.unwrap();
        assert_eq!(summaries.len(), SUMMARY_LIMIT);

        let block = summaries_block(&summaries);
        assert!(block.starts_with("Previous conversations:\n- ["));
        assert_eq!(block.lines().count(), SUMMARY_LIMIT + 1);
        assert!(summaries_block(&[]).is_empty());
    }
}
