//! Fallback strategies and the pieces the fallback engine evaluates.
//!
//! A strategy activates when *all* of its conditions hold against the
//! latest health snapshot of a service. Strategies are evaluated in
//! ascending priority; the first match wins.

mod catalog;
mod condition;
mod scoring;
mod strategy;

pub use catalog::FallbackStrategyCatalog;
pub use condition::{condition_value, evaluate_condition, strategy_matches};
pub use scoring::{rank_services, score_service, ScoredService, DEFAULT_RECOMMENDATION_LIMIT};
pub use strategy::{
    ActiveFallback, FallbackAction, FallbackCondition, FallbackConditionType, FallbackLogEntry,
    FallbackResult, FallbackStrategy, FallbackTrigger, RecoveryAction,
};
