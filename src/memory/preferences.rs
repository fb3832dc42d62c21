//! Learned resident preferences with confidence scoring
//!
//! Confidence starts at 0.5 for a new observation and grows by 0.15 with
//! every repeated observation, capped at 1.0. An explicit confidence always
//! wins over the computed one.

use crate::error::SoulError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const CONFIDENCE_INCREMENT: f64 = 0.15;
/// Preferences below this confidence stay out of prompts
pub const CONTEXT_MIN_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub id: Uuid,
    pub resident_id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

/// Confidence after observing a preference again
pub fn boosted(confidence: f64) -> f64 {
    (confidence + CONFIDENCE_INCREMENT).min(1.0)
}

fn resolve_confidence(existing: Option<f64>, explicit: Option<f64>) -> f64 {
    match (explicit, existing) {
        (Some(c), _) => c.clamp(0.0, 1.0),
        (None, Some(old)) => boosted(old),
        (None, None) => DEFAULT_CONFIDENCE,
    }
}

/// Storage interface for learned preferences
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Insert or update a preference, returning its id. Updating keeps the id.
    async fn set(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
        confidence: Option<f64>,
    ) -> crate::Result<Uuid>;

    async fn get(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
    ) -> crate::Result<Option<PreferenceRecord>>;

    /// Ordered by category, then confidence descending.
    async fn list(
        &self,
        resident_id: &str,
        category: Option<&str>,
    ) -> crate::Result<Vec<PreferenceRecord>>;

    /// Boost confidence without touching the value. `false` when absent.
    async fn reinforce(&self, resident_id: &str, category: &str, key: &str)
        -> crate::Result<bool>;
}

fn sort_records(records: &mut [PreferenceRecord]) {
    records.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Prompt block summarising preferences at or above `min_confidence`,
/// grouped by category. Empty when nothing qualifies.
pub fn context_block(records: &[PreferenceRecord], min_confidence: f64) -> String {
    let mut by_category: BTreeMap<&str, Vec<&PreferenceRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.confidence >= min_confidence) {
        by_category.entry(&record.category).or_default().push(record);
    }

    if by_category.is_empty() {
        return String::new();
    }

    let lines: Vec<String> = by_category
        .into_iter()
        .map(|(category, items)| {
            let entries: Vec<String> = items
                .iter()
                .map(|p| format!("{}: {}{}", p.key, p.value, confidence_suffix(p.confidence)))
                .collect();
            format!("  {}: {}", category, entries.join(", "))
        })
        .collect();

    format!("Preferences:\n{}", lines.join("\n"))
}

/// " (65%)" for uncertain preferences, nothing once confidence reaches 0.9
pub fn confidence_suffix(confidence: f64) -> String {
    if confidence < 0.9 {
        format!(" ({:.0}%)", confidence * 100.0)
    } else {
        String::new()
    }
}

/// Fetch and render a resident's preference block.
pub async fn preferences_context(
    store: &dyn PreferenceStore,
    resident_id: &str,
) -> crate::Result<String> {
    let records = store.list(resident_id, None).await?;
    Ok(context_block(&records, CONTEXT_MIN_CONFIDENCE))
}

//
// ================= In-memory backend =================
//

type PreferenceKey = (String, String, String);

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    records: Arc<RwLock<HashMap<PreferenceKey, PreferenceRecord>>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key_of(resident_id: &str, category: &str, key: &str) -> PreferenceKey {
    (resident_id.to_string(), category.to_string(), key.to_string())
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn set(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
        confidence: Option<f64>,
    ) -> crate::Result<Uuid> {
        let mut locked = self.records.write().await;

        let entry = locked
            .entry(key_of(resident_id, category, key))
            .and_modify(|existing| {
                existing.confidence = resolve_confidence(Some(existing.confidence), confidence);
                existing.value = value.to_string();
                existing.source = source.to_string();
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| PreferenceRecord {
                id: Uuid::new_v4(),
                resident_id: resident_id.to_string(),
                category: category.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                confidence: resolve_confidence(None, confidence),
                source: source.to_string(),
                updated_at: Utc::now(),
            });

        debug!(
            resident_id,
            category,
            key,
            confidence = entry.confidence,
            "Preference stored"
        );
        Ok(entry.id)
    }

    async fn get(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
    ) -> crate::Result<Option<PreferenceRecord>> {
        let locked = self.records.read().await;
        Ok(locked.get(&key_of(resident_id, category, key)).cloned())
    }

    async fn list(
        &self,
        resident_id: &str,
        category: Option<&str>,
    ) -> crate::Result<Vec<PreferenceRecord>> {
        let locked = self.records.read().await;
        let mut records: Vec<PreferenceRecord> = locked
            .values()
            .filter(|r| r.resident_id == resident_id)
            .filter(|r| category.map_or(true, |c| r.category == c))
            .cloned()
            .collect();
        sort_records(&mut records);
        Ok(records)
    }

    async fn reinforce(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
    ) -> crate::Result<bool> {
        let mut locked = self.records.write().await;
        match locked.get_mut(&key_of(resident_id, category, key)) {
            Some(record) => {
                record.confidence = boosted(record.confidence);
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

//
// ================= Postgres backend =================
//

/// Postgres-backed store. The table is created on first use.
pub struct PgPreferenceStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn db_error(context: &str, e: sqlx::Error) -> SoulError {
    SoulError::Database(format!("{}: {}", context, e))
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Build a lazily-connecting pool; no connection is made until first use.
    pub fn connect_lazy(database_url: &str) -> crate::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| db_error("Failed to configure preference store pool", e))?;
        info!("Preference store backend: postgres");
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> crate::Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS resident_preferences (
                      id UUID PRIMARY KEY,
                      resident_id TEXT NOT NULL,
                      category TEXT NOT NULL,
                      key TEXT NOT NULL,
                      value TEXT NOT NULL,
                      confidence DOUBLE PRECISION NOT NULL,
                      source TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      UNIQUE (resident_id, category, key)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| db_error("Failed to initialize preference schema", e))?;

        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> crate::Result<PreferenceRecord> {
        let read = |e| db_error("Malformed preference row", e);
        Ok(PreferenceRecord {
            id: row.try_get("id").map_err(read)?,
            resident_id: row.try_get("resident_id").map_err(read)?,
            category: row.try_get("category").map_err(read)?,
            key: row.try_get("key").map_err(read)?,
            value: row.try_get("value").map_err(read)?,
            confidence: row.try_get("confidence").map_err(read)?,
            source: row.try_get("source").map_err(read)?,
            updated_at: row.try_get("updated_at").map_err(read)?,
        })
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn set(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
        confidence: Option<f64>,
    ) -> crate::Result<Uuid> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin preference transaction", e))?;

        let existing = sqlx::query(
            "SELECT id, confidence FROM resident_preferences \
             WHERE resident_id = $1 AND category = $2 AND key = $3 FOR UPDATE",
        )
        .bind(resident_id)
        .bind(category)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to look up preference", e))?;

        let id = match existing {
            Some(row) => {
                let id: Uuid = row
                    .try_get("id")
                    .map_err(|e| db_error("Malformed preference row", e))?;
                let old: f64 = row
                    .try_get("confidence")
                    .map_err(|e| db_error("Malformed preference row", e))?;

                sqlx::query(
                    "UPDATE resident_preferences \
                     SET value = $1, confidence = $2, source = $3, updated_at = NOW() \
                     WHERE id = $4",
                )
                .bind(value)
                .bind(resolve_confidence(Some(old), confidence))
                .bind(source)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to update preference", e))?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO resident_preferences \
                     (id, resident_id, category, key, value, confidence, source) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(id)
                .bind(resident_id)
                .bind(category)
                .bind(key)
                .bind(value)
                .bind(resolve_confidence(None, confidence))
                .bind(source)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to insert preference", e))?;
                id
            }
        };

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit preference", e))?;

        Ok(id)
    }

    async fn get(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
    ) -> crate::Result<Option<PreferenceRecord>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT * FROM resident_preferences \
             WHERE resident_id = $1 AND category = $2 AND key = $3",
        )
        .bind(resident_id)
        .bind(category)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load preference", e))?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list(
        &self,
        resident_id: &str,
        category: Option<&str>,
    ) -> crate::Result<Vec<PreferenceRecord>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM resident_preferences \
             WHERE resident_id = $1 AND ($2::TEXT IS NULL OR category = $2) \
             ORDER BY category, confidence DESC, key",
        )
        .bind(resident_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list preferences", e))?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn reinforce(
        &self,
        resident_id: &str,
        category: &str,
        key: &str,
    ) -> crate::Result<bool> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "UPDATE resident_preferences \
             SET confidence = LEAST(1.0, confidence + $4), updated_at = NOW() \
             WHERE resident_id = $1 AND category = $2 AND key = $3",
        )
        .bind(resident_id)
        .bind(category)
        .bind(key)
        .bind(CONFIDENCE_INCREMENT)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to reinforce preference", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_preference_starts_at_default_confidence() {
        let store = InMemoryPreferenceStore::new();
        store
            .set("r1", "drink", "morning", "tea", "conversation", None)
            .await
            .unwrap();

        let record = store.get("r1", "drink", "morning").await.unwrap().unwrap();
        assert_eq!(record.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(record.value, "tea");
    }

    #[tokio::test]
    async fn test_repeated_set_boosts_and_caps_confidence() {
        let store = InMemoryPreferenceStore::new();
        let first = store
            .set("r1", "drink", "morning", "tea", "observed", None)
            .await
            .unwrap();

        store
            .set("r1", "drink", "morning", "coffee", "observed", None)
            .await
            .unwrap();
        let record = store.get("r1", "drink", "morning").await.unwrap().unwrap();
        assert!((record.confidence - 0.65).abs() < 1e-9);
        assert_eq!(record.value, "coffee");
        assert_eq!(record.id, first);

        for _ in 0..10 {
            store
                .set("r1", "drink", "morning", "coffee", "observed", None)
                .await
                .unwrap();
        }
        let record = store.get("r1", "drink", "morning").await.unwrap().unwrap();
        assert_eq!(record.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_explicit_confidence_wins() {
        let store = InMemoryPreferenceStore::new();
        store
            .set("r1", "food", "dessert", "pie", "staff", Some(0.9))
            .await
            .unwrap();
        store
            .set("r1", "food", "dessert", "cake", "staff", Some(0.2))
            .await
            .unwrap();

        let record = store.get("r1", "food", "dessert").await.unwrap().unwrap();
        assert_eq!(record.confidence, 0.2);
    }

    #[tokio::test]
    async fn test_reinforce() {
        let store = InMemoryPreferenceStore::new();
        assert!(!store.reinforce("r1", "food", "lunch").await.unwrap());

        store
            .set("r1", "food", "lunch", "soup", "observed", None)
            .await
            .unwrap();
        assert!(store.reinforce("r1", "food", "lunch").await.unwrap());

        let record = store.get("r1", "food", "lunch").await.unwrap().unwrap();
        assert!((record.confidence - 0.65).abs() < 1e-9);
        assert_eq!(record.value, "soup");
    }

    #[tokio::test]
    async fn test_list_ordering_and_filter() {
        let store = InMemoryPreferenceStore::new();
        store.set("r1", "food", "a", "x", "s", Some(0.4)).await.unwrap();
        store.set("r1", "food", "b", "y", "s", Some(0.8)).await.unwrap();
        store.set("r1", "drink", "c", "z", "s", None).await.unwrap();
        store.set("r2", "drink", "c", "w", "s", None).await.unwrap();

        let all = store.list("r1", None).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);

        let food = store.list("r1", Some("food")).await.unwrap();
        assert_eq!(food.len(), 2);
    }

    #[tokio::test]
    async fn test_context_block() {
        let store = InMemoryPreferenceStore::new();
        store.set("r1", "drink", "morning", "tea", "s", Some(0.95)).await.unwrap();
        store.set("r1", "food", "lunch", "soup", "s", None).await.unwrap();
        store.set("r1", "food", "snack", "chips", "s", Some(0.1)).await.unwrap();

        let block = preferences_context(&store, "r1").await.unwrap();
        assert_eq!(
            block,
            "Preferences:\n  drink: morning: tea\n  food: lunch: soup (50%)"
        );
        assert!(preferences_context(&store, "nobody").await.unwrap().is_empty());
    }
}
