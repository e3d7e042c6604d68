//! Trigger rules: weighted conditions over note events mapped to actions.
//!
//! A rule matches only when every condition holds. Weights feed the
//! reported confidence and never gate matching.

mod catalog;
mod condition;
mod context;
mod rule;

pub use catalog::TriggerRuleCatalog;
pub use condition::{
    check_condition, compare_signal, confidence, content_change_ratio, ConditionCheck, SignalKind,
};
pub use context::{
    ChangeType, ExecutedAction, MatchedRule, TriggerContext, TriggerLogEntry, TriggerResult,
};
pub use rule::{
    ConditionValue, RuleMetadata, TriggerAction, TriggerActionType, TriggerCondition,
    TriggerConditionType, TriggerOperator, TriggerRule, TriggerRulePatch, MAX_RULE_PRIORITY,
    MAX_SCHEDULE_DELAY_MINUTES, MIN_RULE_PRIORITY,
};
