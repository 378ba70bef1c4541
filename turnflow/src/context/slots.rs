//! Named slots that stages fill in as a run progresses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage-written outputs of one run.
///
/// Every slot starts empty. A stage reading a slot must tolerate it being
/// absent, since the stage that fills it may have failed or be disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnSlots {
    /// Facts extracted from the conversation.
    pub facts: Vec<serde_json::Value>,
    /// Number of memory records written.
    pub memories_written: usize,
    /// Mood computed for the turn.
    pub mood: Option<serde_json::Value>,
    /// Events generated from the conversation.
    pub events: Vec<serde_json::Value>,
    /// Named numeric scores.
    pub scores: HashMap<String, f64>,
    /// Detected conflicts.
    pub conflicts: Vec<serde_json::Value>,
    /// Touchpoints scheduled for follow-up.
    pub touchpoints: Vec<serde_json::Value>,
    /// Conversation summary.
    pub summary: Option<String>,
    /// Assembled prompt for the next turn.
    pub prompt: Option<String>,
    /// Anything not covered above.
    pub extras: HashMap<String, serde_json::Value>,
}

impl TurnSlots {
    /// Creates empty slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an extra value, overwriting any previous one.
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extras.insert(key.into(), value);
    }

    /// Gets an extra value.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }

    /// Gets a score.
    #[must_use]
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_default_empty() {
        let slots = TurnSlots::new();
        assert!(slots.facts.is_empty());
        assert!(slots.mood.is_none());
        assert!(slots.summary.is_none());
        assert_eq!(slots.memories_written, 0);
    }

    #[test]
    fn test_extras() {
        let mut slots = TurnSlots::new();
        slots.set_extra("language", serde_json::json!("en"));
        slots.set_extra("language", serde_json::json!("de"));

        assert_eq!(slots.extra("language"), Some(&serde_json::json!("de")));
        assert!(slots.extra("missing").is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let slots: TurnSlots = serde_json::from_str(r#"{"summary": "short"}"#).unwrap();
        assert_eq!(slots.summary.as_deref(), Some("short"));
        assert!(slots.scores.is_empty());
    }
}
