//! Interaction audit log
//!
//! Every processed utterance leaves a record with the executed plan and its
//! fingerprint, so a plan can be replayed through the dispatcher later and
//! checked for tampering.

use crate::models::{ActionPlan, ActionResult, IntentCategory};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_UTTERANCE_CHARS: usize = 200;
const MAX_RESPONSE_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub interaction_id: Uuid,
    pub resident_id: Option<String>,
    pub intent: IntentCategory,
    pub utterance: String,
    pub response: String,
    pub model_used: String,
    pub plan: ActionPlan,
    pub results: Vec<ActionResult>,
    pub plan_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        resident_id: Option<String>,
        intent: IntentCategory,
        utterance: &str,
        response: &str,
        model_used: &str,
        plan: ActionPlan,
        results: Vec<ActionResult>,
    ) -> Self {
        Self {
            interaction_id: Uuid::new_v4(),
            resident_id,
            intent,
            utterance: truncate_chars(utterance, MAX_UTTERANCE_CHARS),
            response: truncate_chars(response, MAX_RESPONSE_CHARS),
            model_used: model_used.to_string(),
            plan_fingerprint: plan_fingerprint(&plan),
            plan,
            results,
            created_at: Utc::now(),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Records kept before the oldest is evicted
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// In-memory interaction trail, bounded to the most recent records
pub struct InteractionLog {
    inner: Arc<RwLock<LogInner>>,
    max_records: usize,
}

#[derive(Default)]
struct LogInner {
    records: HashMap<Uuid, InteractionRecord>,
    /// Insertion order, oldest at the front
    order: VecDeque<Uuid>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            max_records: max_records.max(1),
        }
    }

    pub async fn record(&self, record: InteractionRecord) -> Result<Uuid> {
        let id = record.interaction_id;
        let mut inner = self.inner.write().await;

        while inner.order.len() >= self.max_records {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
            }
        }

        inner.order.push_back(id);
        inner.records.insert(id, record);
        Ok(id)
    }

    pub async fn get(&self, interaction_id: Uuid) -> Result<Option<InteractionRecord>> {
        Ok(self.inner.read().await.records.get(&interaction_id).cloned())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Newest first; `None` matches every resident.
    pub async fn recent(
        &self,
        resident_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<InteractionRecord>> {
        let inner = self.inner.read().await;

        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.records.get(id))
            .filter(|r| resident_id.map_or(true, |id| r.resident_id.as_deref() == Some(id)))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Whether the stored plan still matches its fingerprint
    pub async fn verify_integrity(&self, interaction_id: Uuid) -> Result<bool> {
        let inner = self.inner.read().await;

        match inner.records.get(&interaction_id) {
            Some(record) => Ok(plan_fingerprint(&record.plan) == record.plan_fingerprint),
            None => Ok(false),
        }
    }
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex SHA-256 of the plan's JSON form, streamed straight into the hasher
pub fn plan_fingerprint(plan: &ActionPlan) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), plan).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
