//! Evaluation of fallback conditions against a health snapshot.

use crate::health::ServiceHealth;

use super::strategy::{FallbackCondition, FallbackConditionType, FallbackStrategy};

/// The health value a condition type reads, or `None` for `custom`.
pub fn condition_value(kind: FallbackConditionType, health: &ServiceHealth) -> Option<f64> {
    match kind {
        FallbackConditionType::ErrorRate => Some(health.error_rate),
        FallbackConditionType::ResponseTime => Some(health.response_time_ms),
        FallbackConditionType::CostLimit => Some(health.cost_usd),
        FallbackConditionType::Availability => Some(if health.available { 1.0 } else { 0.0 }),
        FallbackConditionType::Custom => None,
    }
}

/// Compare the condition's health field against its threshold.
pub fn evaluate_condition(condition: &FallbackCondition, health: &ServiceHealth) -> bool {
    match condition_value(condition.kind, health) {
        Some(value) => condition.operator.compare(value, condition.threshold),
        None => {
            tracing::warn!(
                service = %health.service,
                "Custom fallback conditions are not supported; treating as unmet"
            );
            false
        }
    }
}

/// True when every condition holds. A strategy without conditions never matches.
pub fn strategy_matches(strategy: &FallbackStrategy, health: &ServiceHealth) -> bool {
    !strategy.conditions.is_empty()
        && strategy
            .conditions
            .iter()
            .all(|condition| evaluate_condition(condition, health))
}
