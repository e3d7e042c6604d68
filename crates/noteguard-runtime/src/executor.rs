//! The action executor seam.
//!
//! Engines decide *what* to do and *when*; an [`ActionExecutor`] does the
//! work. Commands are a closed enum so every action kind is handled
//! explicitly by implementors.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

use noteguard_core::{
    FallbackAction, RecoveryAction, ServiceKey, TriggerAction, TriggerActionType, TriggerContext,
};

/// A single action failed. Captured at the action boundary and never
/// propagated out of an evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Action failed: {0}")]
    Failed(String),

    #[error("Action timed out after {0:?}")]
    Timeout(Duration),

    #[error("Action not supported: {0}")]
    Unsupported(String),
}

/// Optional structured output of a successful action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ActionOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn json(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

/// Who asked for a trigger action, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInvocation {
    pub rule_id: String,
    pub user_id: String,

    #[serde(default)]
    pub note_id: Option<String>,

    pub requested_at: DateTime<Utc>,
}

/// A trigger action with its parameters resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCommand {
    AnalyzeNote {
        invocation: TriggerInvocation,
        analysis_types: Vec<String>,
        parameters: Map<String, Value>,
    },
    BatchAnalyze {
        invocation: TriggerInvocation,
        max_notes: Option<u64>,
        parameters: Map<String, Value>,
    },
    SendNotification {
        invocation: TriggerInvocation,
        message: String,
        channel: Option<String>,
    },
    LogEvent {
        invocation: TriggerInvocation,
        event: String,
        level: String,
        parameters: Map<String, Value>,
    },
    ScheduleAnalysis {
        invocation: TriggerInvocation,
        run_at: DateTime<Utc>,
        analysis_types: Vec<String>,
    },
    UpdatePriority {
        invocation: TriggerInvocation,
        priority: f64,
    },
    TriggerWebhook {
        invocation: TriggerInvocation,
        url: String,
        payload: Value,
    },
}

impl TriggerCommand {
    /// Resolve a declared action against the context that matched it.
    ///
    /// Fails when the action's parameters cannot be turned into a command,
    /// such as a schedule delay that overflows the calendar.
    pub fn from_action(
        action: &TriggerAction,
        invocation: TriggerInvocation,
        context: &TriggerContext,
    ) -> Result<Self, ActionError> {
        let parameters = action.parameters.clone();

        let command = match action.kind {
            TriggerActionType::AnalyzeNote => Self::AnalyzeNote {
                invocation,
                analysis_types: string_list(action, "analysis_types"),
                parameters,
            },
            TriggerActionType::BatchAnalyze => Self::BatchAnalyze {
                invocation,
                max_notes: action.parameters.get("max_notes").and_then(Value::as_u64),
                parameters,
            },
            TriggerActionType::SendNotification => Self::SendNotification {
                message: action
                    .str_param("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Rule {} triggered", invocation.rule_id)),
                channel: action.str_param("channel").map(str::to_string),
                invocation,
            },
            TriggerActionType::LogEvent => Self::LogEvent {
                event: action
                    .str_param("event")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("rule.{}", invocation.rule_id)),
                level: action.str_param("level").unwrap_or("info").to_string(),
                invocation,
                parameters,
            },
            TriggerActionType::ScheduleAnalysis => {
                let minutes = action.number_param("delay_minutes").unwrap_or(0.0).max(0.0);
                let run_at = ChronoDuration::try_milliseconds((minutes * 60_000.0) as i64)
                    .and_then(|delay| invocation.requested_at.checked_add_signed(delay))
                    .ok_or_else(|| {
                        ActionError::Failed(format!(
                            "schedule_analysis delay of {} minutes is out of range",
                            minutes
                        ))
                    })?;
                Self::ScheduleAnalysis {
                    run_at,
                    analysis_types: string_list(action, "analysis_types"),
                    invocation,
                }
            }
            TriggerActionType::UpdatePriority => Self::UpdatePriority {
                priority: action.number_param("priority").unwrap_or_default(),
                invocation,
            },
            TriggerActionType::TriggerWebhook => {
                let mut payload = json!({
                    "rule_id": invocation.rule_id,
                    "user_id": context.user_id,
                    "note_id": context.note_id,
                    "change_type": context.change_type,
                    "timestamp": context.timestamp,
                    "triggered_at": invocation.requested_at,
                });
                if let (Some(extra), Some(obj)) = (action.parameters.get("payload"), payload.as_object_mut()) {
                    obj.insert("data".to_string(), extra.clone());
                }
                Self::TriggerWebhook {
                    url: action.str_param("url").unwrap_or_default().to_string(),
                    payload,
                    invocation,
                }
            }
        };

        Ok(command)
    }

    pub fn kind(&self) -> TriggerActionType {
        match self {
            Self::AnalyzeNote { .. } => TriggerActionType::AnalyzeNote,
            Self::BatchAnalyze { .. } => TriggerActionType::BatchAnalyze,
            Self::SendNotification { .. } => TriggerActionType::SendNotification,
            Self::LogEvent { .. } => TriggerActionType::LogEvent,
            Self::ScheduleAnalysis { .. } => TriggerActionType::ScheduleAnalysis,
            Self::UpdatePriority { .. } => TriggerActionType::UpdatePriority,
            Self::TriggerWebhook { .. } => TriggerActionType::TriggerWebhook,
        }
    }

    pub fn invocation(&self) -> &TriggerInvocation {
        match self {
            Self::AnalyzeNote { invocation, .. }
            | Self::BatchAnalyze { invocation, .. }
            | Self::SendNotification { invocation, .. }
            | Self::LogEvent { invocation, .. }
            | Self::ScheduleAnalysis { invocation, .. }
            | Self::UpdatePriority { invocation, .. }
            | Self::TriggerWebhook { invocation, .. } => invocation,
        }
    }
}

fn string_list(action: &TriggerAction, key: &str) -> Vec<String> {
    match action.parameters.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// Work handed to an [`ActionExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionCommand {
    Fallback {
        service: ServiceKey,
        strategy_id: String,
        action: FallbackAction,

        /// Resolved destination for switch actions
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ServiceKey>,
    },
    Recovery {
        service: ServiceKey,
        strategy_id: String,
        action: RecoveryAction,
    },
    Trigger(TriggerCommand),
}

impl ActionCommand {
    /// Action name as recorded in audit entries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fallback { action, .. } => action.name(),
            Self::Recovery { action, .. } => action.name(),
            Self::Trigger(command) => command.kind().as_str(),
        }
    }
}

/// Performs the concrete work behind an action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, command: &ActionCommand) -> Result<ActionOutput, ActionError>;
}

/// Run a command, converting an overrun into [`ActionError::Timeout`].
pub async fn execute_with_timeout(
    executor: &dyn ActionExecutor,
    command: &ActionCommand,
    timeout: Duration,
) -> Result<ActionOutput, ActionError> {
    match tokio::time::timeout(timeout, executor.execute(command)).await {
        Ok(result) => result,
        Err(_) => Err(ActionError::Timeout(timeout)),
    }
}

/// Logs every command and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExecutor;

#[async_trait]
impl ActionExecutor for TracingExecutor {
    async fn execute(&self, command: &ActionCommand) -> Result<ActionOutput, ActionError> {
        match command {
            ActionCommand::Fallback {
                service,
                strategy_id,
                target,
                ..
            } => {
                tracing::info!(
                    service = %service,
                    strategy = %strategy_id,
                    action = command.name(),
                    destination = ?target,
                    "Executing fallback action"
                );
            }
            ActionCommand::Recovery {
                service,
                strategy_id,
                ..
            } => {
                tracing::info!(
                    service = %service,
                    strategy = %strategy_id,
                    action = command.name(),
                    "Executing recovery action"
                );
            }
            ActionCommand::Trigger(trigger) => {
                let invocation = trigger.invocation();
                tracing::info!(
                    rule = %invocation.rule_id,
                    user = %invocation.user_id,
                    note = invocation.note_id.as_deref(),
                    action = command.name(),
                    "Executing trigger action"
                );
            }
        }

        serde_json::to_value(command)
            .map(ActionOutput::json)
            .map_err(|e| ActionError::Failed(e.to_string()))
    }
}
