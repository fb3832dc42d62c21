//! Companion memory
//!
//! Conversation turns, learned preferences, resident/facility context and
//! conversation summaries. Every store sits behind a trait so the brain and
//! dispatcher can run against in-memory or Postgres backends.

pub mod context;
pub mod conversations;
pub mod preferences;
pub mod store;

pub use context::{
    FacilityMap, FacilityObject, InMemoryResidents, Location, ResidentDirectory, ResidentProfile,
    ResidentSeed, StaticFacility,
};
pub use conversations::{
    summaries_block, ConversationLog, ConversationSummary, InMemoryConversationLog, SUMMARY_LIMIT,
};
pub use preferences::{
    context_block, preferences_context, InMemoryPreferenceStore, PgPreferenceStore,
    PreferenceRecord, PreferenceStore,
};
pub use store::{ConversationHistory, ConversationTurn, TurnRole};
