//! Trigger evaluation input and output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::types::duration_ms;

use super::rule::{TriggerAction, TriggerActionType, TriggerCondition};

/// What happened to the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Scheduled,
}

/// A domain event passed to the trigger engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub user_id: String,

    #[serde(default)]
    pub note_id: Option<String>,

    #[serde(default)]
    pub note_content: String,

    #[serde(default)]
    pub previous_content: Option<String>,

    pub change_type: ChangeType,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TriggerContext {
    pub fn new(user_id: impl Into<String>, change_type: ChangeType, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            note_id: None,
            note_content: String::new(),
            previous_content: None,
            change_type,
            timestamp,
            metadata: Map::new(),
        }
    }

    pub fn with_note(mut self, note_id: impl Into<String>, content: impl Into<String>) -> Self {
        self.note_id = Some(note_id.into());
        self.note_content = content.into();
        self
    }

    pub fn with_previous_content(mut self, previous: impl Into<String>) -> Self {
        self.previous_content = Some(previous.into());
        self
    }
}

/// A rule whose conditions all held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: u8,
    pub matched_conditions: Vec<TriggerCondition>,

    /// Matched weight over total weight
    pub confidence: f64,

    pub actions: Vec<TriggerAction>,
}

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub rule_id: String,
    pub action: TriggerActionType,
    pub success: bool,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub output: Option<Value>,

    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub triggered: bool,

    /// Sorted by ascending priority, then descending confidence
    pub matched_rules: Vec<MatchedRule>,

    pub executed_actions: Vec<ExecutedAction>,

    #[serde(rename = "processing_time_ms", with = "duration_ms")]
    pub processing_time: Duration,

    pub context: TriggerContext,
}

impl TriggerResult {
    /// A result with nothing matched.
    pub fn empty(context: TriggerContext) -> Self {
        Self {
            triggered: false,
            matched_rules: Vec::new(),
            executed_actions: Vec::new(),
            processing_time: Duration::ZERO,
            context,
        }
    }

    /// Sort matched rules into reporting order.
    pub fn sort_matches(&mut self) {
        self.matched_rules.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
    }

    pub fn failed_actions(&self) -> usize {
        self.executed_actions.iter().filter(|a| !a.success).count()
    }
}

/// Audit record of a triggering evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,

    #[serde(default)]
    pub note_id: Option<String>,

    pub matched_rule_ids: Vec<String>,
    pub actions_executed: usize,
    pub actions_failed: usize,

    #[serde(rename = "processing_time_ms", with = "duration_ms")]
    pub processing_time: Duration,
}

impl TriggerLogEntry {
    pub fn from_result(result: &TriggerResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            user_id: result.context.user_id.clone(),
            note_id: result.context.note_id.clone(),
            matched_rule_ids: result
                .matched_rules
                .iter()
                .map(|m| m.rule_id.clone())
                .collect(),
            actions_executed: result.executed_actions.len(),
            actions_failed: result.failed_actions(),
            processing_time: result.processing_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(id: &str, priority: u8, confidence: f64) -> MatchedRule {
        MatchedRule {
            rule_id: id.to_string(),
            rule_name: id.to_string(),
            priority,
            matched_conditions: vec![],
            confidence,
            actions: vec![],
        }
    }

    #[test]
    fn test_sort_by_priority_then_confidence() {
        let mut result = TriggerResult::empty(TriggerContext::new("u1", ChangeType::Updated, Utc::now()));
        result.matched_rules = vec![
            matched("low", 5, 1.0),
            matched("high-weak", 1, 0.5),
            matched("high-strong", 1, 1.0),
        ];
        result.sort_matches();

        let order: Vec<_> = result.matched_rules.iter().map(|m| m.rule_id.as_str()).collect();
        assert_eq!(order, vec!["high-strong", "high-weak", "low"]);
    }

    #[test]
    fn test_context_from_json() {
        let json = r#"{
            "user_id": "u1",
            "note_id": "n1",
            "note_content": "hello",
            "change_type": "updated",
            "timestamp": "2025-01-01T00:00:00Z"
        }"#;
        let ctx: TriggerContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.note_id.as_deref(), Some("n1"));
        assert!(ctx.previous_content.is_none());
        assert!(ctx.metadata.is_empty());
    }
}
