//! Runtime configuration loaded from `SOUL_*` environment variables

use std::env;

pub const DEFAULT_QUICK_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_PLANNING_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone)]
pub struct SoulConfig {
    // -- model tiers --
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub quick_model: String,
    pub planning_model: String,
    pub quick_max_tokens: u32,
    pub planning_max_tokens: u32,
    pub request_timeout_secs: u64,

    // -- identity --
    pub robot_name: String,
    pub facility_name: String,

    // -- interaction --
    /// Quick-tier acknowledgment while the planning tier works
    pub interim_response: bool,
    pub history_turns: usize,

    // -- policy server (navigation / manipulation) --
    pub policy_enabled: bool,
    pub policy_host: String,
    pub policy_port: u16,

    // -- persistence --
    pub database_url: Option<String>,
    /// JSON list of resident profiles loaded at startup
    pub residents_file: Option<String>,
    /// JSON facility layout loaded at startup
    pub facility_file: Option<String>,
}

impl Default for SoulConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            quick_model: DEFAULT_QUICK_MODEL.to_string(),
            planning_model: DEFAULT_PLANNING_MODEL.to_string(),
            quick_max_tokens: 256,
            planning_max_tokens: 4096,
            request_timeout_secs: 30,
            robot_name: "Wybe".to_string(),
            facility_name: "Wybe Care".to_string(),
            interim_response: true,
            history_turns: 20,
            policy_enabled: false,
            policy_host: "localhost".to_string(),
            policy_port: 5555,
            database_url: None,
            residents_file: None,
            facility_file: None,
        }
    }
}

impl SoulConfig {
    /// Load config from `SOUL_*` variables, keeping defaults for anything
    /// missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            anthropic_api_key: soul_var("ANTHROPIC_API_KEY")
                .or_else(|| env::var("ANTHROPIC_API_KEY").ok())
                .unwrap_or_default(),
            anthropic_base_url: soul_var("ANTHROPIC_BASE_URL")
                .unwrap_or(defaults.anthropic_base_url),
            quick_model: soul_var("QUICK_MODEL").unwrap_or(defaults.quick_model),
            planning_model: soul_var("PLANNING_MODEL").unwrap_or(defaults.planning_model),
            quick_max_tokens: parsed("QUICK_MAX_TOKENS", defaults.quick_max_tokens),
            planning_max_tokens: parsed("PLANNING_MAX_TOKENS", defaults.planning_max_tokens),
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            robot_name: soul_var("ROBOT_NAME").unwrap_or(defaults.robot_name),
            facility_name: soul_var("FACILITY_NAME").unwrap_or(defaults.facility_name),
            interim_response: flag("INTERIM_RESPONSE", defaults.interim_response),
            history_turns: parsed("HISTORY_TURNS", defaults.history_turns),
            policy_enabled: flag("POLICY_ENABLED", defaults.policy_enabled),
            policy_host: soul_var("POLICY_HOST").unwrap_or(defaults.policy_host),
            policy_port: parsed("POLICY_PORT", defaults.policy_port),
            database_url: soul_var("DATABASE_URL").or_else(|| env::var("DATABASE_URL").ok()),
            residents_file: soul_var("RESIDENTS_FILE"),
            facility_file: soul_var("FACILITY_FILE"),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.anthropic_api_key.trim().is_empty()
    }
}

fn soul_var(key: &str) -> Option<String> {
    env::var(format!("SOUL_{}", key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    soul_var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match soul_var(key) {
        Some(v) => parse_flag(&v),
        None => default,
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
