//! System prompt assembly for the quick and planning tiers

use chrono::Local;

const NO_RESIDENT: &str = "No resident identified.";
const NO_FACILITY: &str = "No facility map available.";

/// Context blocks injected into every system prompt
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub robot_name: String,
    pub facility_name: String,
    pub resident_context: String,
    pub facility_context: String,
    pub current_time: String,
    pub conversation_summaries: String,
}

impl PromptContext {
    fn resident(&self) -> &str {
        non_empty_or(&self.resident_context, NO_RESIDENT)
    }

    fn facility(&self) -> &str {
        non_empty_or(&self.facility_context, NO_FACILITY)
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

pub fn current_time() -> String {
    Local::now().format("%A, %B %d, %Y at %I:%M %p").to_string()
}

/// Warm, brief conversational prompt for the quick tier
pub fn quick_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"You are {robot}, a friendly care-home companion robot at {facility}.

Current time: {time}

{resident}

{layout}

{summaries}

Your personality:
- Warm, patient, and genuinely caring
- Speak naturally like a kind friend, not a medical device
- Keep responses brief (1-3 sentences usually)
- Use the resident's name when you know it
- Show empathy and active listening
- If you don't know something, say so honestly
- Never give medical advice; suggest talking to staff instead

Remember: you are talking to an elderly resident who may have cognitive or physical challenges. Be clear, gentle, and reassuring."#,
        robot = ctx.robot_name,
        facility = ctx.facility_name,
        time = ctx.current_time,
        resident = ctx.resident(),
        layout = ctx.facility(),
        summaries = ctx.conversation_summaries,
    )
}

/// Structured JSON planning prompt for the planning tier
pub fn planning_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"You are {robot}, an intelligent care-home companion robot at {facility}. You are the planning module that converts resident requests into structured action plans.

Current time: {time}

{resident}

{layout}

Your task: Given a resident's request, output a JSON action plan. Think step-by-step about what actions are needed, in what order, and with what parameters.

Available action types:
- "speak": Say something to the resident. Parameters: {{"text": "..."}}
- "navigate": Move to a location. Parameters: {{"destination": "...", "reason": "..."}}
- "manipulate": Pick up or interact with an object. Parameters: {{"target": "...", "action": "pick_up|put_down|hand_over|open|close|press"}}
- "wait": Wait for something. Parameters: {{"duration": N, "reason": "..."}}
- "alert_staff": Alert care staff. Parameters: {{"urgency": "low|medium|high|critical", "reason": "..."}}
- "remember": Store a learned preference or fact. Parameters: {{"category": "...", "key": "...", "value": "..."}}
- "query_memory": Look up stored preferences. Parameters: {{"category": "...", "key": "..."}}

Output format (JSON only, no other text):
{{
  "actions": [
    {{
      "action_type": "speak|navigate|manipulate|wait|alert_staff|remember|query_memory",
      "parameters": {{}},
      "priority": 1,
      "depends_on": []
    }}
  ],
  "reasoning": "Brief explanation of your plan"
}}

Rules:
- Always include a "speak" action to acknowledge the resident
- Priority: 1 = highest (do first), 10 = lowest
- Use "depends_on" to reference action indices (0-based) when ordering matters
- For safety concerns, always include an "alert_staff" action
- Keep spoken responses warm and reassuring
- Output ONLY valid JSON, no markdown formatting"#,
        robot = ctx.robot_name,
        facility = ctx.facility_name,
        time = ctx.current_time,
        resident = ctx.resident(),
        layout = ctx.facility(),
    )
}

/// One-sentence acknowledgment while the planning tier works
pub fn acknowledge_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"You are {robot}, a friendly care-home companion robot at {facility}.

{resident}

Give a brief, warm acknowledgment (1 sentence max) that you understood the request and are working on it. Be reassuring. Use the resident's name if known."#,
        robot = ctx.robot_name,
        facility = ctx.facility_name,
        resident = ctx.resident(),
    )
}

pub const SUMMARY_PROMPT: &str = "Summarize this care-home conversation in 1-2 sentences. \
Focus on what the resident wanted and any preferences learned.";

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PromptContext {
        PromptContext {
            robot_name: "Wybe".to_string(),
            facility_name: "Wybe Care".to_string(),
            current_time: "Monday".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_placeholders_for_missing_context() {
        let prompt = quick_prompt(&context());
        assert!(prompt.contains("You are Wybe"));
        assert!(prompt.contains(NO_RESIDENT));
        assert!(prompt.contains(NO_FACILITY));
    }

    #[test]
    fn test_planning_prompt_injects_context() {
        let mut ctx = context();
        ctx.resident_context = "Resident: Ingrid\nRoom: 12".to_string();
        ctx.facility_context = "Facility layout:\n  - garden".to_string();

        let prompt = planning_prompt(&ctx);
        assert!(prompt.contains("Resident: Ingrid"));
        assert!(prompt.contains("Facility layout:"));
        assert!(prompt.contains("\"action_type\""));
        assert!(!prompt.contains(NO_RESIDENT));
    }

    #[test]
    fn test_acknowledge_prompt_is_short_form() {
        let prompt = acknowledge_prompt(&context());
        assert!(prompt.contains("1 sentence max"));
        assert!(!prompt.contains("Current time"));
    }
}
