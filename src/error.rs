//! Error types for the companion brain

use thiserror::Error;

/// Result type alias for brain operations
pub type Result<T> = std::result::Result<T, SoulError>;

#[derive(Error, Debug)]
pub enum SoulError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("Language model unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Actuation error: {0}")]
    Actuation(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Database error: {0}")]
    Database(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
