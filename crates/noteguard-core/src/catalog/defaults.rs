//! Built-in strategies and rules used when no catalog is supplied.

use serde_json::json;
use std::time::Duration;

use crate::fallback::{
    FallbackAction, FallbackCondition, FallbackConditionType, FallbackStrategy, RecoveryAction,
};
use crate::trigger::{
    ConditionValue, RuleMetadata, TriggerAction, TriggerActionType, TriggerCondition,
    TriggerConditionType, TriggerOperator, TriggerRule,
};
use crate::types::ComparisonOperator;

pub fn default_strategies() -> Vec<FallbackStrategy> {
    vec![
        FallbackStrategy {
            id: "provider-unavailable".to_string(),
            name: "Provider unavailable".to_string(),
            priority: 1,
            conditions: vec![FallbackCondition::new(
                FallbackConditionType::Availability,
                ComparisonOperator::Eq,
                0.0,
            )],
            actions: vec![
                FallbackAction::SwitchToRecommended,
                FallbackAction::NotifyAdmin {
                    message: "Provider is unavailable, traffic rerouted".to_string(),
                },
            ],
            recovery_actions: vec![RecoveryAction::RestoreOriginal, RecoveryAction::ResetCounters],
            cooldown_period: Duration::from_secs(5 * 60),
        },
        FallbackStrategy {
            id: "high-error-rate".to_string(),
            name: "High error rate".to_string(),
            priority: 2,
            conditions: vec![FallbackCondition::new(
                FallbackConditionType::ErrorRate,
                ComparisonOperator::Gte,
                0.3,
            )
            .with_time_window(Duration::from_secs(5 * 60))],
            actions: vec![FallbackAction::SwitchToRecommended],
            recovery_actions: vec![RecoveryAction::RestoreOriginal],
            cooldown_period: Duration::from_secs(10 * 60),
        },
        FallbackStrategy {
            id: "slow-response".to_string(),
            name: "Slow responses".to_string(),
            priority: 3,
            conditions: vec![FallbackCondition::new(
                FallbackConditionType::ResponseTime,
                ComparisonOperator::Gt,
                10_000.0,
            )],
            actions: vec![
                FallbackAction::ReduceQuality {
                    max_tokens: Some(1024),
                },
                FallbackAction::UseCache,
            ],
            recovery_actions: vec![RecoveryAction::ClearCache],
            cooldown_period: Duration::from_secs(5 * 60),
        },
        FallbackStrategy {
            id: "cost-limit".to_string(),
            name: "Cost limit reached".to_string(),
            priority: 4,
            conditions: vec![FallbackCondition::new(
                FallbackConditionType::CostLimit,
                ComparisonOperator::Gte,
                50.0,
            )],
            actions: vec![
                FallbackAction::QueueRequest {
                    delay_ms: Duration::from_secs(30),
                },
                FallbackAction::NotifyAdmin {
                    message: "Spend limit reached for provider".to_string(),
                },
            ],
            recovery_actions: vec![],
            cooldown_period: Duration::from_secs(60 * 60),
        },
    ]
}

pub fn default_rules() -> Vec<TriggerRule> {
    vec![
        rule(
            "long-note-analysis",
            "Analyze long notes",
            3,
            vec![
                TriggerCondition::new(
                    TriggerConditionType::ContentLength,
                    TriggerOperator::GreaterThan,
                    ConditionValue::Number(500.0),
                ),
                TriggerCondition::new(
                    TriggerConditionType::ContentChange,
                    TriggerOperator::GreaterThanOrEqual,
                    ConditionValue::Number(0.2),
                )
                .with_weight(0.5),
            ],
            vec![TriggerAction::new(TriggerActionType::AnalyzeNote)
                .with_parameter("analysis_types", json!(["summary", "tags"]))],
        ),
        rule(
            "deadline-keywords",
            "Flag notes mentioning deadlines",
            2,
            vec![TriggerCondition::new(
                TriggerConditionType::KeywordPresence,
                TriggerOperator::Contains,
                ConditionValue::List(vec![
                    "deadline".to_string(),
                    "urgent".to_string(),
                    "asap".to_string(),
                ]),
            )],
            vec![
                TriggerAction::new(TriggerActionType::UpdatePriority).with_parameter("priority", 1),
                TriggerAction::new(TriggerActionType::SendNotification)
                    .with_parameter("message", "A note mentions an upcoming deadline"),
            ],
        ),
        rule(
            "new-note-scheduled",
            "Schedule analysis for new notes",
            5,
            vec![TriggerCondition::new(
                TriggerConditionType::ContentLength,
                TriggerOperator::GreaterThan,
                ConditionValue::Number(100.0),
            )],
            vec![TriggerAction::new(TriggerActionType::ScheduleAnalysis)
                .with_parameter("delay_minutes", 15)],
        ),
        rule(
            "batch-ready",
            "Batch analyze pending notes",
            7,
            vec![TriggerCondition::new(
                TriggerConditionType::BatchSize,
                TriggerOperator::GreaterThanOrEqual,
                ConditionValue::Number(10.0),
            )],
            vec![TriggerAction::new(TriggerActionType::BatchAnalyze)],
        ),
    ]
}

fn rule(
    id: &str,
    name: &str,
    priority: u8,
    conditions: Vec<TriggerCondition>,
    actions: Vec<TriggerAction>,
) -> TriggerRule {
    TriggerRule {
        id: id.to_string(),
        name: name.to_string(),
        enabled: true,
        priority,
        conditions,
        actions,
        metadata: RuleMetadata::default(),
    }
}
