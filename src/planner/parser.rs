//! Plan-output parser: planning-tier text → [`ActionPlan`]
//!
//! The response may wrap its JSON in a fenced code block with an optional
//! language tag; otherwise the raw text is parsed verbatim. Actions are built
//! field by field with defaults (`parameters = {}`, `priority = 5`,
//! `depends_on = []`). An unknown `action_type` rejects the whole plan.

use crate::error::SoulError;
use crate::models::{Action, ActionKind, ActionPlan, ActionType, DEFAULT_PRIORITY};
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

/// Spoken text of the plan used whenever no usable plan comes back
pub const FALLBACK_PLAN_TEXT: &str = "I understand your request. Let me see what I can do for you.";

const DEFAULT_WAIT_SECONDS: f64 = 1.0;

type Params = Map<String, Value>;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\n?(.*?)\n?\s*```")
        .expect("fence pattern must compile");
}

/// Inner content of the first fenced block, or the trimmed text itself.
pub fn extract_json(text: &str) -> &str {
    FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_else(|| text.trim())
}

/// Parse a plan, never failing: malformed output becomes the fallback plan.
pub fn plan_from_response(response: &str) -> ActionPlan {
    match parse_plan_response(response) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "Failed to parse planning output, falling back to speak-only plan");
            ActionPlan::speak_only(FALLBACK_PLAN_TEXT)
        }
    }
}

/// Strict parse of planning-tier output
pub fn parse_plan_response(response: &str) -> Result<ActionPlan> {
    let cleaned = extract_json(response);

    let json: Value = serde_json::from_str(cleaned).map_err(|e| {
        SoulError::InvalidPlan(format!("not valid JSON: {} | raw={}", e, response))
    })?;

    let actions_json = json
        .get("actions")
        .ok_or_else(|| SoulError::InvalidPlan("No actions in response".to_string()))?
        .as_array()
        .ok_or_else(|| SoulError::InvalidPlan("actions is not an array".to_string()))?;

    let actions = actions_json
        .iter()
        .enumerate()
        .map(|(i, a)| parse_action(i, a))
        .collect::<Result<Vec<_>>>()?;

    let reasoning = json
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ActionPlan::new(actions, reasoning))
}

fn parse_action(index: usize, json: &Value) -> Result<Action> {
    let invalid = |msg: &str| SoulError::InvalidPlan(format!("action {}: {}", index, msg));

    let obj = json.as_object().ok_or_else(|| invalid("not an object"))?;

    let action_type: ActionType = obj
        .get("action_type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing action_type"))?
        .parse()
        .map_err(|e: String| invalid(&e))?;

    let empty = Params::new();
    let params = match obj.get("parameters") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(invalid("parameters is not an object")),
    };

    let priority = match obj.get("priority") {
        None | Some(Value::Null) => DEFAULT_PRIORITY,
        Some(v) => {
            let n = as_integer(v).ok_or_else(|| invalid("priority is not an integer"))?;
            n.clamp(1, 10) as u8
        }
    };

    let depends_on = match obj.get("depends_on") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                as_integer(v)
                    .filter(|n| *n >= 0)
                    .map(|n| n as usize)
                    .ok_or_else(|| invalid("depends_on entries must be non-negative integers"))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("depends_on is not an array")),
    };

    Ok(Action::new(build_kind(action_type, params))
        .with_priority(priority)
        .with_depends_on(depends_on))
}

fn build_kind(action_type: ActionType, params: &Params) -> ActionKind {
    match action_type {
        ActionType::Speak => ActionKind::Speak {
            text: text(params, "text").unwrap_or_default(),
        },
        ActionType::Navigate => ActionKind::Navigate {
            destination: text(params, "destination")
                .or_else(|| text(params, "location"))
                .unwrap_or_default(),
            reason: text(params, "reason"),
        },
        ActionType::Manipulate => ActionKind::Manipulate {
            action: text(params, "action").unwrap_or_else(|| "unknown".to_string()),
            target: text(params, "target")
                .or_else(|| text(params, "object"))
                .unwrap_or_else(|| "unknown".to_string()),
        },
        ActionType::Wait => ActionKind::Wait {
            duration: number(params, "duration")
                .or_else(|| number(params, "duration_seconds"))
                .unwrap_or(DEFAULT_WAIT_SECONDS),
            reason: text(params, "reason"),
        },
        ActionType::AlertStaff => ActionKind::AlertStaff {
            urgency: text(params, "urgency").unwrap_or_else(|| "high".to_string()),
            reason: text(params, "reason").unwrap_or_default(),
            message: text(params, "message"),
            resident_id: text(params, "resident_id"),
            utterance: text(params, "utterance"),
        },
        ActionType::Remember => ActionKind::Remember {
            category: text(params, "category").unwrap_or_else(|| "general".to_string()),
            key: text(params, "key").unwrap_or_default(),
            value: text(params, "value").unwrap_or_default(),
            resident_id: text(params, "resident_id"),
        },
        ActionType::QueryMemory => ActionKind::QueryMemory {
            category: text(params, "category"),
            key: text(params, "key"),
            query: text(params, "query"),
            resident_id: text(params, "resident_id"),
        },
    }
}

/// Strings as-is; numbers and bools stringified; anything else absent.
fn text(params: &Params, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(params: &Params, key: &str) -> Option<f64> {
    match params.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}
