//! Intent Router
//!
//! Classifies an utterance into an [`IntentCategory`] with pattern tables only.
//! No network, no allocation beyond the returned intent, and no failure path:
//! it is the one component guaranteed to run during a full backend outage,
//! so it alone decides whether an utterance is an emergency.
//!
//! Categories are checked in strict priority order, first match wins:
//! emergency, greeting, farewell, navigate, item, preference, information,
//! help, simple chat, and finally complex plan for everything else.

use crate::models::{Intent, IntentCategory};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

/// Substring vocabulary, checked against the lower-cased text
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "help", "fall", "fallen", "fell", "pain", "emergency", "hurt", "hurts",
    "bleeding", "chest", "breathe", "breath", "can't breathe", "dizzy",
    "faint", "unconscious", "ambulance", "911", "stroke", "heart attack",
    "choking", "fire", "sos", "urgent", "call nurse", "nurse",
];

const NAVIGATE_KEYWORDS: &[&str] = &[
    "go to", "take me", "bring me to", "walk me", "navigate", "escort",
    "where is", "how do i get to", "lead me", "show me the way",
    "walk to", "move to", "go back", "return to",
];

const ITEM_KEYWORDS: &[&str] = &[
    "bring", "fetch", "get me", "could you get", "can you get",
    "i need my", "grab", "hand me", "pass me",
    "bring me", "get my", "find my", "where is my", "where are my",
    "give me", "could i have", "can i have", "may i have",
];

const HELP_KEYWORDS: &[&str] = &[
    "help me", "assist", "i'm stuck", "i can't", "having trouble",
    "confused", "don't understand", "what should i", "how do i",
    "can you help", "need help", "need assistance",
];

const PERSON_STOPWORDS: &[&str] = &["me", "us", "them", "her", "him", "it", "the", "a", "an", "my"];

/// Entities longer than this are treated as extraction noise
const MAX_ENTITY_LEN: usize = 60;

const EMERGENCY_CONFIDENCE: f32 = 0.95;
const SOCIAL_CONFIDENCE: f32 = 0.9;
const REQUEST_CONFIDENCE: f32 = 0.85;
const PREFERENCE_CONFIDENCE: f32 = 0.8;
const INFORMATION_CONFIDENCE: f32 = 0.8;
const HELP_CONFIDENCE: f32 = 0.75;
const CHAT_CONFIDENCE: f32 = 0.7;
const DEFAULT_CONFIDENCE: f32 = 0.5;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("router pattern must compile"))
        .collect()
}

lazy_static! {
    static ref GREETING_PATTERNS: Vec<Regex> = compile(&[
        r"\b(hello|hi|hey|good\s+morning|good\s+afternoon|good\s+evening|howdy|hiya)\b",
        r"^(hi|hey|hello)[!.,]?\s*$",
        r"\bhow\s+are\s+you\b",
        r"\bnice\s+to\s+(see|meet)\b",
    ]);

    static ref FAREWELL_PATTERNS: Vec<Regex> = compile(&[
        r"\b(goodbye|bye|see\s+you|good\s+night|goodnight|take\s+care|farewell|later|so\s+long)\b",
        r"\bsee\s+you\s+(later|tomorrow|soon)\b",
        r"\bgood\s*night\b",
    ]);

    /// "i need a NOUN" is a fetch; "i need to VERB" is not.
    static ref ITEM_PATTERNS: Vec<Regex> = compile(&[
        r"\bi\s+(?:need|want)\s+(?:my|a|an|the|some)\s+\w+",
    ]);

    static ref PREFERENCE_PATTERNS: Vec<Regex> = compile(&[
        r"\bi\s+(like|love|prefer|enjoy|hate|dislike|don't\s+like|can't\s+stand)\b",
        r"\bmy\s+favorite\b",
        r"\bi\s+always\s+(want|have|take|drink|eat)\b",
        r"\bi\s+usually\b",
        r"\bdon't\s+give\s+me\b",
        r"\bi\s+never\s+(want|eat|drink|like)\b",
    ]);

    static ref INFORMATION_PATTERNS: Vec<Regex> = compile(&[
        r"\bwhat\s+(time|day|date|year)\b",
        r"\bwhat('s|\s+is)\s+the\s+(weather|temperature|time|date|day)\b",
        r"\bwhat('s|\s+is)\s+for\s+(lunch|dinner|breakfast)\b",
        r"\btell\s+me\s+about\b",
        r"\bwhat\s+activities\b",
        r"\bwhen\s+is\b",
        r"\bwho\s+is\b",
        r"\bwhat('s|\s+is)\s+happening\b",
        r"\bschedule\b",
        r"\bmenu\b",
    ]);

    static ref SIMPLE_CHAT_PATTERNS: Vec<Regex> = compile(&[
        r"\b(thank|thanks|thank\s+you)\b",
        r"\b(yes|no|yeah|nah|yep|nope|okay|ok|sure|alright)\b",
        r"\b(that's\s+nice|wonderful|lovely|great)\b",
        r"\btell\s+me\s+a\s+(joke|story)\b",
        r"\b(weather|beautiful\s+day)\b",
        r"\bhow('s|\s+is)\s+the\s+weather\b",
        r"\byou('re|\s+are)\s+(nice|kind|sweet|funny|wonderful)\b",
        r"\bi('m|\s+am)\s+(fine|good|well|okay|ok|great|tired|bored)\b",
    ]);

    static ref ITEM_EXTRACTORS: Vec<Regex> = compile(&[
        r"(?i)(?:bring|fetch|get|grab|hand|pass|give)\s+(?:me\s+)?(?:my\s+)?(?:a\s+)?(?:the\s+)?(.+?)(?:\s+please|\s*[.!?]?\s*$)",
        r"(?i)(?:i\s+need|i\s+want|could\s+i\s+have|can\s+i\s+have|may\s+i\s+have)\s+(?:my\s+)?(?:a\s+)?(?:the\s+)?(.+?)(?:\s+please|\s*[.!?]?\s*$)",
        r"(?i)(?:find|where\s+is|where\s+are)\s+(?:my\s+)?(?:the\s+)?(.+?)(?:\s*[.!?]?\s*$)",
    ]);

    static ref LOCATION_EXTRACTORS: Vec<Regex> = compile(&[
        r"(?i)(?:go\s+to|take\s+me\s+to|bring\s+me\s+to|walk\s+me\s+to|navigate\s+to|escort\s+me\s+to|lead\s+me\s+to)\s+(?:the\s+)?(.+?)(?:\s+please|\s*[.!?]?\s*$)",
        r"(?i)(?:where\s+is|how\s+do\s+i\s+get\s+to)\s+(?:the\s+)?(.+?)(?:\s*[.!?]?\s*$)",
        r"(?i)(?:return\s+to|go\s+back\s+to|walk\s+to|move\s+to)\s+(?:the\s+)?(.+?)(?:\s+please|\s*[.!?]?\s*$)",
    ]);

    static ref PERSON_EXTRACTOR: Regex =
        Regex::new(r"(?i)(?:tell|ask|call|find|see|visit|talk\s+to)\s+(\w+)")
            .expect("router pattern must compile");
}

/// Keyword/pattern intent router
pub struct IntentRouter;

impl IntentRouter {
    /// Classify an utterance. Deterministic and infallible.
    pub fn classify(text: &str) -> Intent {
        let lower = text.trim().to_lowercase();

        if let Some(trigger) = EMERGENCY_KEYWORDS.iter().find(|kw| lower.contains(**kw)) {
            let mut entities = BTreeMap::new();
            entities.insert("trigger".to_string(), trigger.to_string());
            return build(IntentCategory::Emergency, EMERGENCY_CONFIDENCE, entities, text);
        }

        if matches_any(&GREETING_PATTERNS, &lower) {
            return build(IntentCategory::Greeting, SOCIAL_CONFIDENCE, BTreeMap::new(), text);
        }

        if matches_any(&FAREWELL_PATTERNS, &lower) {
            return build(IntentCategory::Farewell, SOCIAL_CONFIDENCE, BTreeMap::new(), text);
        }

        if contains_any(NAVIGATE_KEYWORDS, &lower) {
            let mut entities = BTreeMap::new();
            if let Some(location) = extract_location(text) {
                entities.insert("location".to_string(), location);
            }
            return build(IntentCategory::RequestNavigate, REQUEST_CONFIDENCE, entities, text);
        }

        if contains_any(ITEM_KEYWORDS, &lower) || matches_any(&ITEM_PATTERNS, &lower) {
            let mut entities = BTreeMap::new();
            if let Some(item) = extract_item(text) {
                entities.insert("item".to_string(), item);
            }
            return build(IntentCategory::RequestItem, REQUEST_CONFIDENCE, entities, text);
        }

        if matches_any(&PREFERENCE_PATTERNS, &lower) {
            return build(IntentCategory::Preference, PREFERENCE_CONFIDENCE, BTreeMap::new(), text);
        }

        if matches_any(&INFORMATION_PATTERNS, &lower) {
            return build(IntentCategory::Information, INFORMATION_CONFIDENCE, BTreeMap::new(), text);
        }

        if contains_any(HELP_KEYWORDS, &lower) {
            return build(IntentCategory::RequestHelp, HELP_CONFIDENCE, BTreeMap::new(), text);
        }

        if matches_any(&SIMPLE_CHAT_PATTERNS, &lower) {
            return build(IntentCategory::SimpleChat, CHAT_CONFIDENCE, BTreeMap::new(), text);
        }

        let mut entities = BTreeMap::new();
        if let Some(person) = extract_person(text) {
            entities.insert("person".to_string(), person);
        }
        build(IntentCategory::ComplexPlan, DEFAULT_CONFIDENCE, entities, text)
    }
}

fn build(
    category: IntentCategory,
    confidence: f32,
    entities: BTreeMap<String, String>,
    raw_text: &str,
) -> Intent {
    Intent {
        category,
        confidence,
        entities,
        raw_text: raw_text.to_string(),
    }
}

fn contains_any(keywords: &[&str], text: &str) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

/// First capture group of the first matching pattern, cleaned and bounded.
fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        let captured = re.captures(text)?.get(1)?.as_str();
        let cleaned = captured
            .trim()
            .trim_end_matches(|c| matches!(c, '.' | ',' | '!' | '?'));
        if cleaned.is_empty() || cleaned.chars().count() >= MAX_ENTITY_LEN {
            None
        } else {
            Some(cleaned.to_string())
        }
    })
}

pub fn extract_item(text: &str) -> Option<String> {
    first_capture(&ITEM_EXTRACTORS, text)
}

pub fn extract_location(text: &str) -> Option<String> {
    first_capture(&LOCATION_EXTRACTORS, text)
}

/// Only the first verb match is considered; a pronoun there means no name.
pub fn extract_person(text: &str) -> Option<String> {
    let name = PERSON_EXTRACTOR.captures(text)?.get(1)?.as_str().trim();
    if name.is_empty() || PERSON_STOPWORDS.contains(&name.to_lowercase().as_str()) {
        None
    } else {
        Some(name.to_string())
    }
}
