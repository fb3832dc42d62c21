//! Companion Robot Brain
//!
//! Cognitive core of a care-home companion robot:
//! - Classifies every utterance with a pure, infallible intent router
//! - Routes emergencies to a fixed staff alert before any network call
//! - Answers small talk with a quick model tier
//! - Turns complex requests into dependency-ordered action plans
//! - Executes plans with per-action failure isolation
//! - Remembers resident preferences and conversation summaries
//!
//! LOOP:
//! LISTEN → CLASSIFY → THINK (quick | deep) → ACT → REMEMBER

pub mod agent;
pub mod anthropic;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod conversational;
pub mod error;
pub mod execution;
pub mod memory;
pub mod models;
pub mod planner;
pub mod prompt;
pub mod tools;

pub use error::{Result, SoulError};

// Re-export common types
pub use agent::{Brain, CompanionSession};
pub use classifier::IntentRouter;
pub use execution::{resolve_order, Dispatcher, ExecutionOrder};
pub use models::*;
