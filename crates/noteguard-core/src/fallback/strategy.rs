//! Fallback strategy definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::catalog::{is_valid_id, CatalogError};
use crate::types::{duration_ms, duration_ms_opt, ComparisonOperator, ServiceKey};

/// Which health field a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackConditionType {
    ErrorRate,
    ResponseTime,
    CostLimit,
    Availability,

    /// Extension point; always evaluates false
    Custom,
}

impl FallbackConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ErrorRate => "error_rate",
            Self::ResponseTime => "response_time",
            Self::CostLimit => "cost_limit",
            Self::Availability => "availability",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FallbackConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single health comparison. All of a strategy's conditions must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCondition {
    #[serde(rename = "type")]
    pub kind: FallbackConditionType,

    pub operator: ComparisonOperator,

    pub threshold: f64,

    /// Advisory only: evaluation reads the latest health snapshot.
    #[serde(
        default,
        rename = "time_window_ms",
        with = "duration_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_window: Option<Duration>,
}

impl FallbackCondition {
    pub fn new(kind: FallbackConditionType, operator: ComparisonOperator, threshold: f64) -> Self {
        Self {
            kind,
            operator,
            threshold,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, window: Duration) -> Self {
        self.time_window = Some(window);
        self
    }

    /// Human-readable form, e.g. `error_rate gte 0.3`.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.kind, self.operator, self.threshold)
    }
}

/// Remedial action taken when a strategy activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackAction {
    /// Route traffic to a specific provider
    SwitchProvider {
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// Route traffic to the best-ranked alternative service
    SwitchToRecommended,

    /// Stay on the provider but use another model
    SwitchModel { model: String },

    /// Serve cached results where available
    UseCache,

    /// Lower output size or quality
    ReduceQuality {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },

    /// Hold new requests for a while
    QueueRequest {
        #[serde(with = "duration_ms")]
        delay_ms: Duration,
    },

    /// Alert an operator
    NotifyAdmin { message: String },
}

impl FallbackAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwitchProvider { .. } => "switch_provider",
            Self::SwitchToRecommended => "switch_to_recommended",
            Self::SwitchModel { .. } => "switch_model",
            Self::UseCache => "use_cache",
            Self::ReduceQuality { .. } => "reduce_quality",
            Self::QueueRequest { .. } => "queue_request",
            Self::NotifyAdmin { .. } => "notify_admin",
        }
    }
}

/// Action taken when a service recovers from a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryAction {
    RestoreOriginal,
    ClearCache,
    ResetCounters,
    NotifyAdmin { message: String },
}

impl RecoveryAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RestoreOriginal => "restore_original",
            Self::ClearCache => "clear_cache",
            Self::ResetCounters => "reset_counters",
            Self::NotifyAdmin { .. } => "notify_admin",
        }
    }
}

/// A declarative mapping from health conditions to remedial actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub id: String,

    pub name: String,

    /// Lower values are evaluated first
    pub priority: u32,

    pub conditions: Vec<FallbackCondition>,

    pub actions: Vec<FallbackAction>,

    #[serde(default)]
    pub recovery_actions: Vec<RecoveryAction>,

    #[serde(rename = "cooldown_ms", with = "duration_ms")]
    pub cooldown_period: Duration,
}

impl FallbackStrategy {
    /// Check the strategy's shape. Called on registration so malformed
    /// strategies never reach evaluation.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidStrategy {
            id: self.id.clone(),
            reason,
        };

        if !is_valid_id(&self.id) {
            return Err(invalid(format!("invalid id '{}'", self.id)));
        }

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }

        if self.conditions.is_empty() {
            return Err(invalid("at least one condition is required".to_string()));
        }

        if self.actions.is_empty() {
            return Err(invalid("at least one action is required".to_string()));
        }

        for condition in &self.conditions {
            if !condition.threshold.is_finite() {
                return Err(invalid(format!(
                    "threshold for {} must be finite",
                    condition.kind
                )));
            }

            let bounded = matches!(
                condition.kind,
                FallbackConditionType::ErrorRate | FallbackConditionType::Availability
            );
            if bounded && !(0.0..=1.0).contains(&condition.threshold) {
                return Err(invalid(format!(
                    "threshold for {} must be within [0, 1], got {}",
                    condition.kind, condition.threshold
                )));
            }

            if condition.time_window.is_some_and(|w| w.is_zero()) {
                return Err(invalid("time_window_ms must be positive".to_string()));
            }
        }

        for action in &self.actions {
            match action {
                FallbackAction::SwitchProvider { provider, .. } if provider.trim().is_empty() => {
                    return Err(invalid("switch_provider requires a provider".to_string()));
                }
                FallbackAction::SwitchModel { model } if model.trim().is_empty() => {
                    return Err(invalid("switch_model requires a model".to_string()));
                }
                FallbackAction::NotifyAdmin { message } if message.trim().is_empty() => {
                    return Err(invalid("notify_admin requires a message".to_string()));
                }
                _ => {}
            }
        }

        for action in &self.recovery_actions {
            if let RecoveryAction::NotifyAdmin { message } = action {
                if message.trim().is_empty() {
                    return Err(invalid("notify_admin requires a message".to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Record that a service is operating under a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFallback {
    pub service: ServiceKey,
    pub strategy_id: String,
    pub activated_at: DateTime<Utc>,

    /// Operator-supplied reason for manual activations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What caused a fallback log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackTrigger {
    pub strategy_id: String,
    pub strategy_name: String,

    /// Condition description, `manual` for overrides, `recovery` for recoveries
    pub condition: String,

    /// Observed value of the condition's health field
    pub value: f64,

    pub threshold: f64,
}

/// Outcome recorded for a fallback log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    pub success: bool,
    pub provider: String,
    pub model: String,

    #[serde(default)]
    pub response_time_ms: Option<f64>,
}

/// Immutable audit record of an activation or recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: ServiceKey,
    pub trigger: FallbackTrigger,
    pub actions_taken: Vec<String>,
    pub result: FallbackResult,
    pub resolved: bool,
}
