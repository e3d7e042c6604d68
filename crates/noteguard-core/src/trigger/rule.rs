//! Trigger rule definitions.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::catalog::{is_valid_id, is_valid_webhook_url, CatalogError};
use crate::types::duration_ms_opt;

/// Lowest (most urgent) rule priority.
pub const MIN_RULE_PRIORITY: u8 = 1;
/// Highest (least urgent) rule priority.
pub const MAX_RULE_PRIORITY: u8 = 10;

/// Longest `schedule_analysis` delay a rule may request: one year.
pub const MAX_SCHEDULE_DELAY_MINUTES: f64 = 525_600.0;

/// What a trigger condition measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum TriggerConditionType {
    ContentLength,
    TimeInterval,
    KeywordPresence,
    ContentChange,
    BatchSize,
    CostThreshold,
    SentimentThreshold,
    ConceptCount,

    /// Any type this build does not recognise; evaluates false
    Unknown,
}

impl From<String> for TriggerConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "content_length" => Self::ContentLength,
            "time_interval" => Self::TimeInterval,
            "keyword_presence" => Self::KeywordPresence,
            "content_change" => Self::ContentChange,
            "batch_size" => Self::BatchSize,
            "cost_threshold" => Self::CostThreshold,
            "sentiment_threshold" => Self::SentimentThreshold,
            "concept_count" => Self::ConceptCount,
            other => {
                tracing::debug!(condition_type = other, "Unrecognised trigger condition type");
                Self::Unknown
            }
        }
    }
}

impl TriggerConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentLength => "content_length",
            Self::TimeInterval => "time_interval",
            Self::KeywordPresence => "keyword_presence",
            Self::ContentChange => "content_change",
            Self::BatchSize => "batch_size",
            Self::CostThreshold => "cost_threshold",
            Self::SentimentThreshold => "sentiment_threshold",
            Self::ConceptCount => "concept_count",
            Self::Unknown => "unknown",
        }
    }

    /// True for types compared numerically.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::KeywordPresence | Self::Unknown)
    }
}

impl fmt::Display for TriggerConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Matches,
}

impl TriggerOperator {
    pub fn is_numeric(self) -> bool {
        !self.is_textual()
    }

    pub fn is_textual(self) -> bool {
        matches!(self, Self::Contains | Self::NotContains | Self::Matches)
    }

    /// Numeric comparison; `None` for textual operators.
    pub fn compare(self, lhs: f64, rhs: f64) -> Option<bool> {
        let result = match self {
            Self::GreaterThan => lhs > rhs,
            Self::GreaterThanOrEqual => lhs >= rhs,
            Self::LessThan => lhs < rhs,
            Self::LessThanOrEqual => lhs <= rhs,
            Self::Equals => (lhs - rhs).abs() < f64::EPSILON,
            Self::NotEquals => (lhs - rhs).abs() >= f64::EPSILON,
            Self::Contains | Self::NotContains | Self::Matches => return None,
        };
        Some(result)
    }
}

/// Comparison operand: a number, a single string, or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl ConditionValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String operands as a list; empty for numbers.
    pub fn as_terms(&self) -> Vec<&str> {
        match self {
            Self::Number(_) => Vec::new(),
            Self::Text(s) => vec![s.as_str()],
            Self::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    #[serde(rename = "type")]
    pub kind: TriggerConditionType,

    pub operator: TriggerOperator,

    pub value: ConditionValue,

    /// Feeds the reported confidence only; matching is all-or-nothing
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl TriggerCondition {
    pub fn new(kind: TriggerConditionType, operator: TriggerOperator, value: ConditionValue) -> Self {
        Self {
            kind,
            operator,
            value,
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// What to do when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerActionType {
    AnalyzeNote,
    BatchAnalyze,
    SendNotification,
    LogEvent,
    ScheduleAnalysis,
    UpdatePriority,
    TriggerWebhook,
}

impl TriggerActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeNote => "analyze_note",
            Self::BatchAnalyze => "batch_analyze",
            Self::SendNotification => "send_notification",
            Self::LogEvent => "log_event",
            Self::ScheduleAnalysis => "schedule_analysis",
            Self::UpdatePriority => "update_priority",
            Self::TriggerWebhook => "trigger_webhook",
        }
    }
}

impl fmt::Display for TriggerActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAction {
    #[serde(rename = "type")]
    pub kind: TriggerActionType,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Pause before executing the action
    #[serde(
        default,
        rename = "delay_ms",
        with = "duration_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<Duration>,
}

impl TriggerAction {
    pub fn new(kind: TriggerActionType) -> Self {
        Self {
            kind,
            parameters: Map::new(),
            delay: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn number_param(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }
}

/// Bookkeeping maintained by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    #[serde(default)]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,

    #[serde(default)]
    pub trigger_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub id: String,

    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 1-10, lower takes precedence
    pub priority: u8,

    pub conditions: Vec<TriggerCondition>,

    pub actions: Vec<TriggerAction>,

    #[serde(default)]
    pub metadata: RuleMetadata,
}

impl TriggerRule {
    /// Check the rule's shape. Called on registration and update.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidRule {
            id: self.id.clone(),
            reason,
        };

        if !is_valid_id(&self.id) {
            return Err(invalid(format!("invalid id '{}'", self.id)));
        }

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }

        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&self.priority) {
            return Err(invalid(format!(
                "priority must be within {}-{}, got {}",
                MIN_RULE_PRIORITY, MAX_RULE_PRIORITY, self.priority
            )));
        }

        if self.conditions.is_empty() {
            return Err(invalid("at least one condition is required".to_string()));
        }

        if self.actions.is_empty() {
            return Err(invalid("at least one action is required".to_string()));
        }

        for condition in &self.conditions {
            validate_condition(condition).map_err(&invalid)?;
        }

        for action in &self.actions {
            validate_action(action).map_err(&invalid)?;
        }

        Ok(())
    }
}

fn validate_condition(condition: &TriggerCondition) -> Result<(), String> {
    if !condition.weight.is_finite() || condition.weight < 0.0 {
        return Err(format!(
            "weight for {} must be a non-negative number",
            condition.kind
        ));
    }

    match condition.kind {
        // Unknown types are tolerated here and skipped at evaluation.
        TriggerConditionType::Unknown => Ok(()),

        TriggerConditionType::KeywordPresence => {
            if !condition.operator.is_textual() {
                return Err(format!(
                    "keyword_presence does not support operator {:?}",
                    condition.operator
                ));
            }

            let terms = condition.value.as_terms();
            if terms.is_empty() || terms.iter().all(|t| t.trim().is_empty()) {
                return Err("keyword_presence requires at least one keyword".to_string());
            }

            if condition.operator == TriggerOperator::Matches {
                for pattern in terms {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
                }
            }

            Ok(())
        }

        kind => {
            if !condition.operator.is_numeric() {
                return Err(format!("{} requires a numeric operator", kind));
            }

            match condition.value.as_number() {
                Some(n) if n.is_finite() => Ok(()),
                _ => Err(format!("{} requires a numeric value", kind)),
            }
        }
    }
}

fn validate_action(action: &TriggerAction) -> Result<(), String> {
    match action.kind {
        TriggerActionType::UpdatePriority => match action.number_param("priority") {
            Some(p) if p.is_finite() && p >= 0.0 => {}
            Some(p) => {
                return Err(format!("update_priority 'priority' must be non-negative, got {}", p));
            }
            None => {
                return Err("update_priority requires a numeric 'priority' parameter".to_string());
            }
        },
        TriggerActionType::TriggerWebhook => match action.str_param("url") {
            Some(url) if is_valid_webhook_url(url) => {}
            _ => {
                return Err("trigger_webhook requires an http(s) 'url' parameter".to_string());
            }
        },
        TriggerActionType::ScheduleAnalysis => {
            if let Some(minutes) = action.parameters.get("delay_minutes") {
                let in_range = minutes
                    .as_f64()
                    .is_some_and(|m| (0.0..=MAX_SCHEDULE_DELAY_MINUTES).contains(&m));
                if !in_range {
                    return Err(format!(
                        "schedule_analysis 'delay_minutes' must be within 0-{}",
                        MAX_SCHEDULE_DELAY_MINUTES
                    ));
                }
            }
        }
        TriggerActionType::AnalyzeNote
        | TriggerActionType::BatchAnalyze
        | TriggerActionType::SendNotification
        | TriggerActionType::LogEvent => {}
    }

    Ok(())
}

/// Partial update applied by `TriggerRuleCatalog::update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRulePatch {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub priority: Option<u8>,

    #[serde(default)]
    pub conditions: Option<Vec<TriggerCondition>>,

    #[serde(default)]
    pub actions: Option<Vec<TriggerAction>>,
}

impl TriggerRulePatch {
    /// Apply onto a copy of `rule`.
    pub fn apply_to(&self, rule: &TriggerRule) -> TriggerRule {
        let mut updated = rule.clone();
        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(conditions) = &self.conditions {
            updated.conditions = conditions.clone();
        }
        if let Some(actions) = &self.actions {
            updated.actions = actions.clone();
        }
        updated
    }
}
