//! Dispatcher: deterministic plan execution
//!
//! Actions run one at a time in dependency order. A failed action never
//! aborts the plan; actions depending on it are skipped without invoking
//! their handler.
//!
//! There is no cancellation token. Dropping the future returned by
//! [`Dispatcher::execute`] abandons the rest of the plan at the next await
//! point; actions already carried out are not rolled back.

use crate::memory::PreferenceStore;
use crate::models::{Action, ActionKind, ActionPlan, ActionResult};
use crate::tools::{Manipulator, Navigator, Speaker};
use crate::Result;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_ALERT_MESSAGE: &str = "Staff alert triggered";
const PREFERENCE_SOURCE: &str = "conversation";
/// Longest pause a single `Wait` may hold the dispatcher for
pub const MAX_WAIT_SECS: f64 = 300.0;

/// Resolved dispatch order for a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    pub order: Vec<usize>,
    /// Set when a dependency cycle forced the index-order fallback
    pub cycle_detected: bool,
}

/// Topological order of a plan's actions (Kahn's algorithm).
///
/// Among equally-ready actions the lowest index goes first. Edges pointing
/// outside the plan are ignored. Actions left unresolved by a cycle are
/// appended in ascending index order.
pub fn resolve_order(plan: &ActionPlan) -> ExecutionOrder {
    let n = plan.actions.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, action) in plan.actions.iter().enumerate() {
        for &dep in action.depends_on.iter().filter(|&&d| d < n) {
            in_degree[i] += 1;
            dependents[dep].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for &dependent in &dependents[current] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    let cycle_detected = order.len() < n;
    if cycle_detected {
        let mut placed = vec![false; n];
        for &i in &order {
            placed[i] = true;
        }
        let remaining: Vec<usize> = (0..n).filter(|&i| !placed[i]).collect();
        warn!(
            ?remaining,
            "Cycle detected in action dependencies, appending remaining actions in index order"
        );
        order.extend(remaining);
    }

    ExecutionOrder {
        order,
        cycle_detected,
    }
}

/// Executes action plans against the robot's collaborators
pub struct Dispatcher {
    speaker: Arc<dyn Speaker>,
    navigator: Arc<dyn Navigator>,
    manipulator: Arc<dyn Manipulator>,
    preferences: Arc<dyn PreferenceStore>,
    resident_id: Option<String>,
}

impl Dispatcher {
    pub fn new(
        speaker: Arc<dyn Speaker>,
        navigator: Arc<dyn Navigator>,
        manipulator: Arc<dyn Manipulator>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            speaker,
            navigator,
            manipulator,
            preferences,
            resident_id: None,
        }
    }

    /// Resident used by memory actions; takes precedence over the
    /// `resident_id` carried in action parameters.
    pub fn set_resident(&mut self, resident_id: Option<String>) {
        self.resident_id = resident_id;
    }

    pub fn resident_id(&self) -> Option<&str> {
        self.resident_id.as_deref()
    }

    /// Speak outside of any plan (interim responses).
    pub async fn speak(&self, text: &str) {
        self.speaker.speak(text).await;
    }

    /// Execute every action of `plan`, returning one result per action in
    /// dispatch order.
    pub async fn execute(&self, plan: &ActionPlan) -> Vec<ActionResult> {
        let ExecutionOrder { order, .. } = resolve_order(plan);
        let mut results = Vec::with_capacity(order.len());
        let mut succeeded: HashMap<usize, bool> = HashMap::with_capacity(order.len());

        debug!(plan_actions = plan.len(), ?order, "Starting plan execution");

        for idx in order {
            let action = &plan.actions[idx];

            let failed_dependency = action
                .depends_on
                .iter()
                .copied()
                .find(|dep| !succeeded.get(dep).copied().unwrap_or(false));

            let result = match failed_dependency {
                Some(dep) => {
                    warn!(
                        action_index = idx,
                        dependency = dep,
                        "Skipping action due to failed dependency"
                    );
                    ActionResult::skipped(idx, dep)
                }
                None => self.execute_single(idx, action).await,
            };

            succeeded.insert(idx, result.success);
            results.push(result);
        }

        debug!(
            results = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            "Plan execution completed"
        );

        results
    }

    async fn execute_single(&self, idx: usize, action: &Action) -> ActionResult {
        match self.dispatch(idx, &action.kind).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    action_index = idx,
                    action_type = action.kind.type_name(),
                    error = %e,
                    "Action failed"
                );
                ActionResult::failed(idx, e.to_string())
            }
        }
    }

    async fn dispatch(&self, idx: usize, kind: &ActionKind) -> Result<ActionResult> {
        match kind {
            ActionKind::Speak { text } => {
                self.speaker.speak(text).await;
                Ok(ActionResult::succeeded(idx, text.clone()))
            }

            ActionKind::Navigate { destination, .. } => {
                let ok = self.navigator.navigate(destination).await?;
                Ok(outcome(
                    idx,
                    ok,
                    format!("Navigate to {}", destination),
                    format!("Navigation to {} failed", destination),
                ))
            }

            ActionKind::Manipulate { action, target } => {
                let ok = self.manipulator.manipulate(action, target).await?;
                let desc = format!("{} {}", action, target);
                Ok(outcome(idx, ok, desc.clone(), format!("Manipulation failed: {}", desc)))
            }

            ActionKind::Wait { duration, .. } => {
                let seconds = if duration.is_finite() && *duration > 0.0 {
                    *duration
                } else {
                    0.0
                };
                if seconds > MAX_WAIT_SECS {
                    warn!(action_index = idx, seconds, "Wait exceeds limit");
                    return Ok(ActionResult::failed(
                        idx,
                        format!("Wait of {}s exceeds the {}s limit", seconds, MAX_WAIT_SECS),
                    ));
                }
                let delay = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;
                Ok(ActionResult::succeeded(idx, format!("Waited {:?}s", seconds)))
            }

            ActionKind::AlertStaff {
                urgency,
                reason,
                message,
                ..
            } => {
                let message = message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .or_else(|| Some(reason.as_str()).filter(|r| !r.is_empty()))
                    .unwrap_or(DEFAULT_ALERT_MESSAGE);
                warn!(urgency = %urgency, "STAFF ALERT: {}", message);
                self.speaker.speak(&format!("Alert: {}", message)).await;
                Ok(ActionResult::succeeded(idx, message))
            }

            ActionKind::Remember {
                category,
                key,
                value,
                resident_id,
            } => {
                let resident = match self.resolve_resident(resident_id.as_deref()) {
                    Some(resident) if !key.is_empty() => resident,
                    _ => {
                        return Ok(ActionResult::failed(
                            idx,
                            "REMEMBER requires resident_id and key",
                        ))
                    }
                };

                let id = self
                    .preferences
                    .set(resident, category, key, value, PREFERENCE_SOURCE, None)
                    .await?;
                Ok(ActionResult::succeeded(
                    idx,
                    format!("Stored preference {}/{}={} (id={})", category, key, value, id),
                ))
            }

            ActionKind::QueryMemory {
                category,
                key,
                resident_id,
                ..
            } => {
                let Some(resident) = self.resolve_resident(resident_id.as_deref()) else {
                    return Ok(ActionResult::failed(idx, "QUERY_MEMORY requires resident_id"));
                };

                let category = category.as_deref().filter(|c| !c.is_empty());
                let key = key.as_deref().filter(|k| !k.is_empty());

                let text = match (category, key) {
                    (Some(category), Some(key)) => {
                        match self.preferences.get(resident, category, key).await? {
                            Some(p) => format!("{}/{}={}", category, key, p.value),
                            None => format!("{}/{} not found", category, key),
                        }
                    }
                    _ => {
                        let prefs = self.preferences.list(resident, category).await?;
                        if prefs.is_empty() {
                            "No preferences found".to_string()
                        } else {
                            prefs
                                .iter()
                                .map(|p| format!("{}/{}={}", p.category, p.key, p.value))
                                .collect::<Vec<_>>()
                                .join("; ")
                        }
                    }
                };
                Ok(ActionResult::succeeded(idx, text))
            }

            ActionKind::Unknown { action_type, .. } => Ok(ActionResult::failed(
                idx,
                format!("Unknown action type: {}", action_type),
            )),
        }
    }

    fn resolve_resident<'a>(&'a self, from_params: Option<&'a str>) -> Option<&'a str> {
        self.resident_id
            .as_deref()
            .or(from_params)
            .filter(|r| !r.is_empty())
    }
}

fn outcome(idx: usize, ok: bool, result_text: String, failure: String) -> ActionResult {
    ActionResult {
        action_index: idx,
        success: ok,
        result_text,
        error: (!ok).then_some(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SoulError;
    use crate::memory::InMemoryPreferenceStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
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

    /// Navigator/manipulator with a scripted outcome and a call counter
    struct ScriptedActuator {
        outcome: std::result::Result<bool, String>,
        calls: AtomicUsize,
    }

    impl ScriptedActuator {
        fn new(outcome: std::result::Result<bool, String>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn run(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map_err(SoulError::Actuation)
        }
    }

    #[async_trait]
    impl Navigator for ScriptedActuator {
        async fn navigate(&self, _destination: &str) -> Result<bool> {
            self.run()
        }
    }

    #[async_trait]
    impl Manipulator for ScriptedActuator {
        async fn manipulate(&self, _action: &str, _target: &str) -> Result<bool> {
            self.run()
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        speaker: Arc<RecordingSpeaker>,
        navigator: Arc<ScriptedActuator>,
        manipulator: Arc<ScriptedActuator>,
        preferences: Arc<InMemoryPreferenceStore>,
    }

    fn harness(
        navigate: std::result::Result<bool, String>,
        manipulate: std::result::Result<bool, String>,
    ) -> Harness {
        let speaker = Arc::new(RecordingSpeaker::default());
        let navigator = ScriptedActuator::new(navigate);
        let manipulator = ScriptedActuator::new(manipulate);
        let preferences = Arc::new(InMemoryPreferenceStore::new());
        let dispatcher = Dispatcher::new(
            speaker.clone(),
            navigator.clone(),
            manipulator.clone(),
            preferences.clone(),
        );
        Harness {
            dispatcher,
            speaker,
            navigator,
            manipulator,
            preferences,
        }
    }

    fn speak(text: &str) -> Action {
        Action::new(ActionKind::speak(text))
    }

    fn navigate(destination: &str) -> Action {
        Action::new(ActionKind::Navigate {
            destination: destination.to_string(),
            reason: None,
        })
    }

    fn manipulate(action: &str, target: &str) -> Action {
        Action::new(ActionKind::Manipulate {
            action: action.to_string(),
            target: target.to_string(),
        })
    }

    #[test]
    fn test_ready_actions_run_in_index_order() {
        let plan = ActionPlan::new(
            vec![speak("a"), speak("b").with_depends_on([0]), speak("c")],
            "",
        );
        let resolved = resolve_order(&plan);
        assert_eq!(resolved.order, vec![0, 2, 1]);
        assert!(!resolved.cycle_detected);
    }

    #[test]
    fn test_cycle_falls_back_to_index_order() {
        let plan = ActionPlan::new(
            vec![speak("a").with_depends_on([1]), speak("b").with_depends_on([0])],
            "",
        );
        let resolved = resolve_order(&plan);
        assert_eq!(resolved.order, vec![0, 1]);
        assert!(resolved.cycle_detected);
    }

    #[test]
    fn test_out_of_range_dependencies_ignored() {
        let plan = ActionPlan::new(vec![speak("a").with_depends_on([7]), speak("b")], "");
        let resolved = resolve_order(&plan);
        assert_eq!(resolved.order, vec![0, 1]);
        assert!(!resolved.cycle_detected);
    }

    #[test]
    fn test_empty_plan() {
        let resolved = resolve_order(&ActionPlan::default());
        assert!(resolved.order.is_empty());
        assert!(!resolved.cycle_detected);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_handler() {
        let h = harness(Ok(false), Ok(true));
        let plan = ActionPlan::new(
            vec![
                navigate("room 12"),
                manipulate("pick_up", "glasses").with_depends_on([0]),
                speak("Here you go").with_depends_on([1]),
                speak("Independent"),
            ],
            "",
        );

        let results = h.dispatcher.execute(&plan).await;
        let indices: Vec<usize> = results.iter().map(|r| r.action_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("Navigation to room 12 failed"));
        assert_eq!(results[1].error.as_deref(), Some("skipped: dependency 0 failed"));
        assert_eq!(results[2].error.as_deref(), Some("skipped: dependency 1 failed"));
        assert!(results[3].success);

        assert_eq!(h.navigator.calls(), 1);
        assert_eq!(h.manipulator.calls(), 0);
        assert_eq!(*h.speaker.spoken.lock().unwrap(), vec!["Independent"]);
    }

    #[tokio::test]
    async fn test_handler_error_is_isolated() {
        let h = harness(Err("lidar offline".to_string()), Ok(true));
        let plan = ActionPlan::new(vec![navigate("garden"), manipulate("hand_over", "cup")], "");

        let results = h.dispatcher.execute(&plan).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("lidar offline"));
        assert!(results[1].success);
        assert_eq!(results[1].result_text, "hand_over cup");
    }

    #[tokio::test]
    async fn test_self_dependency_is_unsatisfiable() {
        let h = harness(Ok(true), Ok(true));
        let plan = ActionPlan::new(vec![speak("loop").with_depends_on([0])], "");
        let results = h.dispatcher.execute(&plan).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_skip());
        assert!(h.speaker.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_staff_speaks_alert() {
        let h = harness(Ok(true), Ok(true));
        let plan = ActionPlan::new(
            vec![Action::new(ActionKind::AlertStaff {
                urgency: "critical".to_string(),
                reason: "Emergency detected: fall".to_string(),
                message: None,
                resident_id: None,
                utterance: None,
            })],
            "",
        );

        let results = h.dispatcher.execute(&plan).await;
        assert!(results[0].success);
        assert_eq!(results[0].result_text, "Emergency detected: fall");
        assert_eq!(
            *h.speaker.spoken.lock().unwrap(),
            vec!["Alert: Emergency detected: fall"]
        );
    }

    #[tokio::test]
    async fn test_wait_sanitizes_duration() {
        let h = harness(Ok(true), Ok(true));
        let plan = ActionPlan::new(
            vec![Action::new(ActionKind::Wait {
                duration: -3.0,
                reason: None,
            })],
            "",
        );
        let results = h.dispatcher.execute(&plan).await;
        assert!(results[0].success);
        assert_eq!(results[0].result_text, "Waited 0.0s");
    }

    #[tokio::test]
    async fn test_oversized_wait_fails_alone() {
        let h = harness(Ok(true), Ok(true));
        let plan = crate::planner::plan_from_response(
            r#"{"actions":[
                {"action_type":"wait","parameters":{"duration":1e20}},
                {"action_type":"speak","parameters":{"text":"Still here"}}
            ]}"#,
        );
        assert_eq!(plan.len(), 2);

        let results = h.dispatcher.execute(&plan).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("exceeds the 300s limit"));
        assert!(results[1].success);
        assert_eq!(*h.speaker.spoken.lock().unwrap(), vec!["Still here"]);
    }

    #[tokio::test]
    async fn test_remember_and_query_memory() {
        let mut h = harness(Ok(true), Ok(true));

        let remember = Action::new(ActionKind::Remember {
            category: "drink".to_string(),
            key: "morning".to_string(),
            value: "tea".to_string(),
            resident_id: None,
        });
        let missing = h.dispatcher.execute(&ActionPlan::new(vec![remember.clone()], "")).await;
        assert_eq!(
            missing[0].error.as_deref(),
            Some("REMEMBER requires resident_id and key")
        );

        h.dispatcher.set_resident(Some("r1".to_string()));
        let query = |category: Option<&str>, key: Option<&str>| {
            Action::new(ActionKind::QueryMemory {
                category: category.map(str::to_string),
                key: key.map(str::to_string),
                query: None,
                resident_id: None,
            })
        };

        let plan = ActionPlan::new(
            vec![
                remember,
                query(Some("drink"), Some("morning")).with_depends_on([0]),
                query(Some("drink"), Some("evening")).with_depends_on([0]),
                query(None, None).with_depends_on([0]),
            ],
            "",
        );
        let results = h.dispatcher.execute(&plan).await;

        assert!(results.iter().all(|r| r.success));
        assert!(results[0].result_text.starts_with("Stored preference drink/morning=tea (id="));
        assert_eq!(results[1].result_text, "drink/morning=tea");
        assert_eq!(results[2].result_text, "drink/evening not found");
        assert_eq!(results[3].result_text, "drink/morning=tea");

        let stored = h.preferences.get("r1", "drink", "morning").await.unwrap().unwrap();
        assert_eq!(stored.source, "conversation");
    }

    #[tokio::test]
    async fn test_query_memory_requires_resident() {
        let h = harness(Ok(true), Ok(true));
        let plan = ActionPlan::new(
            vec![Action::new(ActionKind::QueryMemory {
                category: None,
                key: None,
                query: Some("what do I like".to_string()),
                resident_id: None,
            })],
            "",
        );
        let results = h.dispatcher.execute(&plan).await;
        assert_eq!(results[0].error.as_deref(), Some("QUERY_MEMORY requires resident_id"));
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_explicitly() {
        let h = harness(Ok(true), Ok(true));
        let plan = ActionPlan::new(
            vec![Action::new(ActionKind::Unknown {
                action_type: "teleport".to_string(),
                parameters: serde_json::Map::new(),
            })],
            "",
        );
        let results = h.dispatcher.execute(&plan).await;
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("Unknown action type: teleport"));
    }
}
