//! Fallback engine: decides when a service should be rerouted.
//!
//! Each reported failure updates the service's health. Strategies are then
//! checked in catalog order and the first whose conditions all hold is
//! activated, unless the service is already under a strategy whose cooldown
//! has not elapsed.
//!
//! Activation is compare-and-set on the per-service entry of a `DashMap`, so
//! two callers racing on the same service activate at most once while
//! unrelated services never contend. Actions run after every lock is
//! released.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use noteguard_core::clock::elapsed_between;
use noteguard_core::fallback::{condition_value, strategy_matches};
use noteguard_core::{
    rank_services, ActiveFallback, AuditLog, CallOutcome, CatalogError, Clock, FallbackAction,
    FallbackLogEntry, FallbackResult, FallbackStrategy, FallbackStrategyCatalog, FallbackTrigger,
    HealthTracker, ScoredService, ServiceHealth, ServiceKey,
};

use crate::config::RuntimeConfig;
use crate::executor::{execute_with_timeout, ActionCommand, ActionExecutor};

/// Outcome of a fallback evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackDecision {
    pub should_fallback: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<FallbackStrategy>,

    /// True only for the call that activated the strategy
    #[serde(default)]
    pub newly_activated: bool,
}

impl FallbackDecision {
    pub fn none() -> Self {
        Self {
            should_fallback: false,
            strategy: None,
            newly_activated: false,
        }
    }

    fn reused(strategy: FallbackStrategy) -> Self {
        Self {
            should_fallback: true,
            strategy: Some(strategy),
            newly_activated: false,
        }
    }

    fn activated(strategy: FallbackStrategy) -> Self {
        Self {
            should_fallback: true,
            strategy: Some(strategy),
            newly_activated: true,
        }
    }
}

/// Point-in-time view for dashboards and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackStatus {
    pub active_fallbacks: Vec<ActiveFallback>,
    pub health: Vec<ServiceHealth>,
    pub recent_logs: Vec<FallbackLogEntry>,
    pub strategies: Vec<FallbackStrategy>,
}

/// Active fallback plus the strategy as it was when activated.
#[derive(Debug, Clone)]
struct ActiveRecord {
    fallback: ActiveFallback,
    strategy: FallbackStrategy,
}

impl ActiveRecord {
    fn in_cooldown(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        elapsed_between(self.fallback.activated_at, now) < self.strategy.cooldown_period
    }
}

enum Claim {
    Won,
    Held(FallbackStrategy),
}

pub struct FallbackEngine {
    health: Arc<HealthTracker>,
    strategies: RwLock<FallbackStrategyCatalog>,
    active: DashMap<ServiceKey, ActiveRecord>,
    log: AuditLog<FallbackLogEntry>,
    executor: Arc<dyn ActionExecutor>,
    clock: Arc<dyn Clock>,
    action_timeout: Duration,
    recommendation_limit: usize,
}

impl FallbackEngine {
    pub fn new(
        health: Arc<HealthTracker>,
        strategies: FallbackStrategyCatalog,
        executor: Arc<dyn ActionExecutor>,
        clock: Arc<dyn Clock>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            health,
            strategies: RwLock::new(strategies),
            active: DashMap::new(),
            log: AuditLog::new(config.fallback_audit_capacity),
            executor,
            clock,
            action_timeout: config.action_timeout,
            recommendation_limit: config.recommendation_limit,
        }
    }

    /// Decide whether `service` should fall back after `outcome`.
    ///
    /// Never fails: action errors are logged and recorded in the audit
    /// entry.
    pub async fn evaluate(&self, service: &ServiceKey, outcome: &CallOutcome) -> FallbackDecision {
        if outcome.is_failure() {
            self.health.report(service, outcome);
        }

        let now = self.clock.now();

        if let Some(strategy) = self.strategy_in_cooldown(service, now) {
            tracing::debug!(
                service = %service,
                strategy = %strategy.id,
                "Fallback already active, reusing"
            );
            return FallbackDecision::reused(strategy);
        }

        let Some(health) = self.health.get(service) else {
            return FallbackDecision::none();
        };

        let candidate = self
            .strategies
            .read()
            .ordered()
            .find(|strategy| strategy_matches(strategy, &health))
            .cloned();

        let Some(strategy) = candidate else {
            return FallbackDecision::none();
        };

        match self.claim(service, &strategy, now, None, false) {
            Claim::Held(current) => FallbackDecision::reused(current),
            Claim::Won => {
                let trigger = condition_trigger(&strategy, &health);
                tracing::info!(
                    service = %service,
                    strategy = %strategy.id,
                    condition = %trigger.condition,
                    value = trigger.value,
                    "Fallback strategy activated"
                );
                self.run_actions(service, &strategy, trigger, now).await;
                FallbackDecision::activated(strategy)
            }
        }
    }

    /// Operator override: activate a strategy without checking its
    /// conditions. Replaces whatever is active for the service.
    pub async fn activate(
        &self,
        strategy_id: &str,
        service: &ServiceKey,
        reason: Option<String>,
    ) -> Result<ActiveFallback, CatalogError> {
        let strategy = self
            .strategies
            .read()
            .get(strategy_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownStrategy(strategy_id.to_string()))?;

        let now = self.clock.now();
        self.claim(service, &strategy, now, reason.clone(), true);

        tracing::info!(
            service = %service,
            strategy = %strategy.id,
            reason = reason.as_deref().unwrap_or(""),
            "Fallback strategy manually activated"
        );

        let trigger = FallbackTrigger {
            strategy_id: strategy.id.clone(),
            strategy_name: strategy.name.clone(),
            condition: "manual".to_string(),
            value: 0.0,
            threshold: 0.0,
        };
        self.run_actions(service, &strategy, trigger, now).await;

        Ok(ActiveFallback {
            service: service.clone(),
            strategy_id: strategy.id,
            activated_at: now,
            reason,
        })
    }

    /// Leave fallback mode: run recovery actions, clear the active record and
    /// reset the service's failure counters.
    ///
    /// Returns false, changing nothing, when no fallback is active.
    pub async fn recover(&self, service: &ServiceKey) -> bool {
        let Some((_, record)) = self.active.remove(service) else {
            return false;
        };

        let now = self.clock.now();
        let strategy = record.strategy;
        let mut actions_taken = Vec::with_capacity(strategy.recovery_actions.len());
        let mut success = true;

        for action in &strategy.recovery_actions {
            let command = ActionCommand::Recovery {
                service: service.clone(),
                strategy_id: strategy.id.clone(),
                action: action.clone(),
            };
            match execute_with_timeout(self.executor.as_ref(), &command, self.action_timeout).await {
                Ok(_) => actions_taken.push(command.name().to_string()),
                Err(e) => {
                    success = false;
                    tracing::warn!(
                        service = %service,
                        strategy = %strategy.id,
                        action = command.name(),
                        error = %e,
                        "Recovery action failed"
                    );
                }
            }
        }

        self.health.reset_failures(service);

        self.log.append(FallbackLogEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            service: service.clone(),
            trigger: FallbackTrigger {
                strategy_id: strategy.id.clone(),
                strategy_name: strategy.name.clone(),
                condition: "recovery".to_string(),
                value: 0.0,
                threshold: 0.0,
            },
            actions_taken,
            result: FallbackResult {
                success,
                provider: service.provider.clone(),
                model: service.model.clone(),
                response_time_ms: self.health.get(service).map(|h| h.response_time_ms),
            },
            resolved: true,
        });

        tracing::info!(service = %service, strategy = %strategy.id, "Service recovered");
        true
    }

    /// Rank every other known service, best first.
    pub fn recommend(&self, original: &ServiceKey, exclude_providers: &[String]) -> Vec<ScoredService> {
        rank_services(
            &self.health.snapshot(),
            original,
            exclude_providers,
            self.recommendation_limit,
        )
    }

    /// Snapshot for dashboards. Fallbacks whose cooldown has elapsed are
    /// left out even if no evaluation has cleared them yet.
    pub fn status(&self, log_tail: usize) -> FallbackStatus {
        let now = self.clock.now();
        let mut active_fallbacks: Vec<ActiveFallback> = self
            .active
            .iter()
            .filter(|entry| entry.value().in_cooldown(now))
            .map(|entry| entry.value().fallback.clone())
            .collect();
        active_fallbacks.sort_by(|a, b| a.service.cmp(&b.service));

        FallbackStatus {
            active_fallbacks,
            health: self.health.snapshot(),
            recent_logs: self.log.recent(log_tail),
            strategies: self.strategies(),
        }
    }

    pub fn active_fallback(&self, service: &ServiceKey) -> Option<ActiveFallback> {
        self.active.get(service).map(|r| r.fallback.clone())
    }

    pub fn add_strategy(&self, strategy: FallbackStrategy) -> Result<(), CatalogError> {
        self.strategies.write().add(strategy)
    }

    pub fn update_strategy(&self, strategy: FallbackStrategy) -> Result<(), CatalogError> {
        self.strategies.write().update(strategy)
    }

    /// Unknown ids are a no-op. Services already under the strategy keep it
    /// until recovery or cooldown expiry.
    pub fn remove_strategy(&self, id: &str) -> Option<FallbackStrategy> {
        self.strategies.write().remove(id)
    }

    /// Registered strategies in evaluation order.
    pub fn strategies(&self) -> Vec<FallbackStrategy> {
        self.strategies.read().ordered().cloned().collect()
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn log(&self) -> &AuditLog<FallbackLogEntry> {
        &self.log
    }

    /// The active strategy if still within cooldown. Expired records are
    /// dropped.
    fn strategy_in_cooldown(
        &self,
        service: &ServiceKey,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<FallbackStrategy> {
        let expired_at = {
            let record = self.active.get(service)?;
            if record.in_cooldown(now) {
                return Some(record.strategy.clone());
            }
            record.fallback.activated_at
        };

        // Only drop the record we saw; a concurrent activation may have replaced it.
        if self
            .active
            .remove_if(service, |_, r| r.fallback.activated_at == expired_at)
            .is_some()
        {
            tracing::debug!(service = %service, "Fallback cooldown elapsed");
        }
        None
    }

    /// Compare-and-set insertion of the active record. Unless `force`d, an
    /// existing record still in cooldown wins.
    fn claim(
        &self,
        service: &ServiceKey,
        strategy: &FallbackStrategy,
        now: chrono::DateTime<chrono::Utc>,
        reason: Option<String>,
        force: bool,
    ) -> Claim {
        let record = ActiveRecord {
            fallback: ActiveFallback {
                service: service.clone(),
                strategy_id: strategy.id.clone(),
                activated_at: now,
                reason,
            },
            strategy: strategy.clone(),
        };

        match self.active.entry(service.clone()) {
            Entry::Occupied(mut occupied) => {
                if !force && occupied.get().in_cooldown(now) {
                    return Claim::Held(occupied.get().strategy.clone());
                }
                occupied.insert(record);
                Claim::Won
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Claim::Won
            }
        }
    }

    /// Execute a strategy's actions in order and append the audit entry.
    /// A failing action does not stop the ones after it.
    async fn run_actions(
        &self,
        service: &ServiceKey,
        strategy: &FallbackStrategy,
        trigger: FallbackTrigger,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let mut actions_taken = Vec::with_capacity(strategy.actions.len());
        let mut success = true;
        let mut destination: Option<ServiceKey> = None;

        for action in &strategy.actions {
            let target = self.resolve_target(service, action);
            if destination.is_none() {
                destination = target.clone();
            }

            let command = ActionCommand::Fallback {
                service: service.clone(),
                strategy_id: strategy.id.clone(),
                action: action.clone(),
                target,
            };

            match execute_with_timeout(self.executor.as_ref(), &command, self.action_timeout).await {
                Ok(_) => actions_taken.push(command.name().to_string()),
                Err(e) => {
                    success = false;
                    tracing::warn!(
                        service = %service,
                        strategy = %strategy.id,
                        action = command.name(),
                        error = %e,
                        "Fallback action failed"
                    );
                }
            }
        }

        let destination = destination.unwrap_or_else(|| service.clone());
        let response_time_ms = self.health.get(&destination).map(|h| h.response_time_ms);

        self.log.append(FallbackLogEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            service: service.clone(),
            trigger,
            actions_taken,
            result: FallbackResult {
                success,
                provider: destination.provider,
                model: destination.model,
                response_time_ms,
            },
            resolved: false,
        });
    }

    fn resolve_target(&self, service: &ServiceKey, action: &FallbackAction) -> Option<ServiceKey> {
        match action {
            FallbackAction::SwitchProvider { provider, model } => Some(ServiceKey::new(
                provider.clone(),
                model.clone().unwrap_or_else(|| service.model.clone()),
            )),
            FallbackAction::SwitchModel { model } => {
                Some(ServiceKey::new(service.provider.clone(), model.clone()))
            }
            FallbackAction::SwitchToRecommended => self
                .recommend(service, std::slice::from_ref(&service.provider))
                .into_iter()
                .next()
                .map(|scored| scored.service),
            FallbackAction::UseCache
            | FallbackAction::ReduceQuality { .. }
            | FallbackAction::QueueRequest { .. }
            | FallbackAction::NotifyAdmin { .. } => None,
        }
    }
}

/// Audit trigger for a condition-driven activation.
fn condition_trigger(strategy: &FallbackStrategy, health: &ServiceHealth) -> FallbackTrigger {
    let first = strategy.conditions.first();
    FallbackTrigger {
        strategy_id: strategy.id.clone(),
        strategy_name: strategy.name.clone(),
        condition: strategy
            .conditions
            .iter()
            .map(|c| c.describe())
            .collect::<Vec<_>>()
            .join(" && "),
        value: first
            .and_then(|c| condition_value(c.kind, health))
            .unwrap_or_default(),
        threshold: first.map(|c| c.threshold).unwrap_or_default(),
    }
}
