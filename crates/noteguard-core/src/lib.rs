//! # noteguard-core
//!
//! Deterministic model for the note service's resilience layer.
//!
//! This crate answers two questions without doing any I/O of its own:
//! - Is a backend healthy enough to keep using, and if not, which fallback
//!   strategy applies?
//! - Does a note event match any automation rule?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: time comes from an injected [`Clock`]
//! 2. **Ordered**: strategies and rules are evaluated by ascending priority,
//!    then registration order
//! 3. **Fail fast**: malformed strategies and rules are rejected when
//!    registered, never at evaluation time
//! 4. **Bounded**: audit logs are ring buffers
//!
//! The async engines that execute actions live in `noteguard-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use noteguard_core::{CallOutcome, HealthTracker, ServiceKey, SystemClock};
//!
//! let tracker = HealthTracker::new(Arc::new(SystemClock));
//! let key: ServiceKey = "openai:gpt-4o".parse().unwrap();
//!
//! for _ in 0..4 {
//!     tracker.report(&key, &CallOutcome::failure("timeout"));
//! }
//!
//! let health = tracker.get(&key).unwrap();
//! assert_eq!(health.consecutive_failures, 4);
//! assert!((health.error_rate - 0.4).abs() < 1e-9);
//! ```

pub mod audit;
pub mod catalog;
pub mod clock;
pub mod fallback;
pub mod health;
pub mod trigger;
pub mod types;

// Re-export main types at crate root
pub use audit::{AuditLog, DEFAULT_AUDIT_CAPACITY};
pub use catalog::{default_rules, default_strategies, CatalogDocument, CatalogError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::{
    rank_services, score_service, ActiveFallback, FallbackAction, FallbackCondition,
    FallbackConditionType, FallbackLogEntry, FallbackResult, FallbackStrategy,
    FallbackStrategyCatalog, FallbackTrigger, RecoveryAction, ScoredService,
    DEFAULT_RECOMMENDATION_LIMIT,
};
pub use health::{HealthTracker, ServiceHealth};
pub use trigger::{
    ChangeType, ConditionValue, ExecutedAction, MatchedRule, RuleMetadata, SignalKind,
    TriggerAction, TriggerActionType, TriggerCondition, TriggerConditionType, TriggerContext,
    TriggerLogEntry, TriggerOperator, TriggerResult, TriggerRule, TriggerRuleCatalog,
    TriggerRulePatch, MAX_SCHEDULE_DELAY_MINUTES,
};
pub use types::{CallOutcome, ComparisonOperator, ServiceKey};
