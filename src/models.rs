//! Core data models: utterance → intent → action plan → results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Emergency,
    Greeting,
    Farewell,
    SimpleChat,
    RequestItem,
    RequestNavigate,
    RequestHelp,
    ComplexPlan,
    Preference,
    Information,
}

impl IntentCategory {
    /// Whether the category calls for the planning tier by its nature.
    pub fn needs_deep_planning(self) -> bool {
        matches!(self, IntentCategory::ComplexPlan | IntentCategory::RequestHelp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntentCategory::Emergency => "emergency",
            IntentCategory::Greeting => "greeting",
            IntentCategory::Farewell => "farewell",
            IntentCategory::SimpleChat => "simple_chat",
            IntentCategory::RequestItem => "request_item",
            IntentCategory::RequestNavigate => "request_navigate",
            IntentCategory::RequestHelp => "request_help",
            IntentCategory::ComplexPlan => "complex_plan",
            IntentCategory::Preference => "preference",
            IntentCategory::Information => "information",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified intent of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub category: IntentCategory,
    pub confidence: f32,
    pub entities: BTreeMap<String, String>,
    pub raw_text: String,
}

impl Intent {
    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }
}

//
// ================= Actions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Speak,
    Navigate,
    Manipulate,
    Wait,
    AlertStaff,
    Remember,
    QueryMemory,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Speak => "speak",
            ActionType::Navigate => "navigate",
            ActionType::Manipulate => "manipulate",
            ActionType::Wait => "wait",
            ActionType::AlertStaff => "alert_staff",
            ActionType::Remember => "remember",
            ActionType::QueryMemory => "query_memory",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "speak" => Ok(ActionType::Speak),
            "navigate" => Ok(ActionType::Navigate),
            "manipulate" => Ok(ActionType::Manipulate),
            "wait" => Ok(ActionType::Wait),
            "alert_staff" => Ok(ActionType::AlertStaff),
            "remember" => Ok(ActionType::Remember),
            "query_memory" => Ok(ActionType::QueryMemory),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

/// Per-type action payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action_type", content = "parameters", rename_all = "snake_case")]
pub enum ActionKind {
    Speak {
        text: String,
    },
    Navigate {
        destination: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Manipulate {
        action: String,
        target: String,
    },
    Wait {
        /// Seconds
        duration: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    AlertStaff {
        urgency: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        resident_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        utterance: Option<String>,
    },
    Remember {
        category: String,
        key: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        resident_id: Option<String>,
    },
    QueryMemory {
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        resident_id: Option<String>,
    },
    /// Forward-compatible payload for a type this build does not know.
    /// The dispatcher reports it as a failure.
    Unknown {
        action_type: String,
        parameters: serde_json::Map<String, serde_json::Value>,
    },
}

impl ActionKind {
    pub fn speak(text: impl Into<String>) -> Self {
        ActionKind::Speak { text: text.into() }
    }

    /// `None` for [`ActionKind::Unknown`].
    pub fn action_type(&self) -> Option<ActionType> {
        Some(match self {
            ActionKind::Speak { .. } => ActionType::Speak,
            ActionKind::Navigate { .. } => ActionType::Navigate,
            ActionKind::Manipulate { .. } => ActionType::Manipulate,
            ActionKind::Wait { .. } => ActionType::Wait,
            ActionKind::AlertStaff { .. } => ActionType::AlertStaff,
            ActionKind::Remember { .. } => ActionType::Remember,
            ActionKind::QueryMemory { .. } => ActionType::QueryMemory,
            ActionKind::Unknown { .. } => return None,
        })
    }

    pub fn type_name(&self) -> &str {
        match self {
            ActionKind::Unknown { action_type, .. } => action_type,
            known => known.action_type().map(ActionType::as_str).unwrap_or("unknown"),
        }
    }
}

pub const DEFAULT_PRIORITY: u8 = 5;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// One executable step. `priority` 1 runs first, 10 last.
/// `depends_on` holds indices into the owning plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub priority: u8,
    pub depends_on: Vec<usize>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            priority: DEFAULT_PRIORITY,
            depends_on: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self
    }

    /// Set dependencies, dropping repeats while keeping first-seen order.
    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on.clear();
        for dep in deps {
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn action_type(&self) -> Option<ActionType> {
        self.kind.action_type()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
    pub reasoning: String,
}

impl ActionPlan {
    pub fn new(actions: Vec<Action>, reasoning: impl Into<String>) -> Self {
        Self {
            actions,
            reasoning: reasoning.into(),
        }
    }

    /// One `Speak` action at priority 1 with no dependencies.
    pub fn speak_only(text: impl Into<String>) -> Self {
        Self {
            actions: vec![Action::new(ActionKind::speak(text)).with_priority(1)],
            reasoning: String::new(),
        }
    }

    /// Text of the first `Speak` action, if any.
    pub fn first_spoken_text(&self) -> Option<&str> {
        self.actions.iter().find_map(|a| match &a.kind {
            ActionKind::Speak { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_index: usize,
    pub success: bool,
    pub result_text: String,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn succeeded(action_index: usize, result_text: impl Into<String>) -> Self {
        Self {
            action_index,
            success: true,
            result_text: result_text.into(),
            error: None,
        }
    }

    pub fn failed(action_index: usize, error: impl Into<String>) -> Self {
        Self {
            action_index,
            success: false,
            result_text: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn skipped(action_index: usize, failed_dependency: usize) -> Self {
        Self::failed(
            action_index,
            format!("skipped: dependency {} failed", failed_dependency),
        )
    }

    pub fn is_skip(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.starts_with("skipped:"))
            .unwrap_or(false)
    }
}

//
// ================= Interaction =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Quick,
    Deep,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelTier::Quick => "quick",
            ModelTier::Deep => "deep",
        };
        write!(f, "{}", s)
    }
}

/// Output of one orchestration pass.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionResult {
    pub intent: Intent,
    pub response_text: String,
    pub action_plan: ActionPlan,
    pub resident_id: Option<String>,
    pub model_tier: ModelTier,
    pub model_used: String,
    pub interim_response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_only_plan() {
        let plan = ActionPlan::speak_only("hi");
        assert_eq!(plan.actions.len(), 1);
        let action = &plan.actions[0];
        assert_eq!(action.action_type(), Some(ActionType::Speak));
        assert_eq!(action.priority, 1);
        assert!(action.depends_on.is_empty());
        assert_eq!(plan.first_spoken_text(), Some("hi"));
    }

    #[test]
    fn test_needs_deep_planning() {
        assert!(IntentCategory::ComplexPlan.needs_deep_planning());
        assert!(IntentCategory::RequestHelp.needs_deep_planning());
        assert!(!IntentCategory::RequestItem.needs_deep_planning());
        assert!(!IntentCategory::Emergency.needs_deep_planning());
    }

    #[test]
    fn test_action_type_from_str() {
        assert_eq!("alert_staff".parse::<ActionType>(), Ok(ActionType::AlertStaff));
        assert_eq!(" Speak ".parse::<ActionType>(), Ok(ActionType::Speak));
        assert!("teleport".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_builder_clamps_and_dedupes() {
        let action = Action::new(ActionKind::speak("x"))
            .with_priority(42)
            .with_depends_on([2, 0, 2]);
        assert_eq!(action.priority, MAX_PRIORITY);
        assert_eq!(action.depends_on, vec![2, 0]);
    }

    #[test]
    fn test_action_serializes_flat() {
        let action = Action::new(ActionKind::Navigate {
            destination: "garden".to_string(),
            reason: None,
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action_type"], "navigate");
        assert_eq!(json["parameters"]["destination"], "garden");
        assert_eq!(json["priority"], 5);
        assert!(json["depends_on"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_skip_result() {
        let result = ActionResult::skipped(3, 1);
        assert!(!result.success);
        assert!(result.is_skip());
        assert_eq!(result.error.as_deref(), Some("skipped: dependency 1 failed"));
        assert!(!ActionResult::failed(0, "boom").is_skip());
    }
}
