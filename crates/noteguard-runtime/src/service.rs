//! The resilience service: one object owning health tracking, both
//! engines and the health sweep.
//!
//! Construct it once at startup with [`ResilienceService::builder`], call
//! [`ResilienceService::start`] to begin the periodic sweep and
//! [`ResilienceService::shutdown`] to stop it.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use noteguard_core::{
    ActiveFallback, CallOutcome, CatalogDocument, Clock, FallbackStrategy,
    FallbackStrategyCatalog, HealthTracker, ScoredService, ServiceHealth, ServiceKey,
    SystemClock, TriggerContext, TriggerLogEntry, TriggerResult, TriggerRule, TriggerRuleCatalog,
    TriggerRulePatch,
};

use crate::config::RuntimeConfig;
use crate::executor::{ActionExecutor, TracingExecutor};
use crate::resilience::{FallbackDecision, FallbackEngine, FallbackStatus, HealthSweeper};
use crate::signals::{NoSignals, TriggerSignals};
use crate::triggers::TriggerEngine;
use crate::ResilienceError;

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ResilienceService {
    health: Arc<HealthTracker>,
    fallback: FallbackEngine,
    triggers: TriggerEngine,
    sweeper: HealthSweeper,
    config: RuntimeConfig,
    running: Mutex<Option<Running>>,
}

impl ResilienceService {
    pub fn builder() -> ResilienceServiceBuilder {
        ResilienceServiceBuilder::new()
    }

    /// Start the periodic health sweep. Must be called inside a Tokio
    /// runtime.
    pub fn start(&self) -> Result<(), ResilienceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ResilienceError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = self.sweeper.start_with_shutdown(shutdown_rx);
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the sweep and wait for it to finish. A no-op if not started.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        // A send error means the task already exited.
        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "Health sweep task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Record a call outcome for `service`.
    pub fn report_outcome(&self, service: &ServiceKey, outcome: &CallOutcome) {
        self.health.report(service, outcome);
    }

    /// Decide whether `service` should fall back. Failed outcomes are
    /// recorded before strategies are checked.
    pub async fn evaluate_fallback(
        &self,
        service: &ServiceKey,
        outcome: &CallOutcome,
    ) -> FallbackDecision {
        self.fallback.evaluate(service, outcome).await
    }

    pub fn recommend_services(
        &self,
        original: &ServiceKey,
        exclude_providers: &[String],
    ) -> Vec<ScoredService> {
        self.fallback.recommend(original, exclude_providers)
    }

    pub async fn activate_fallback(
        &self,
        strategy_id: &str,
        service: &ServiceKey,
        reason: Option<String>,
    ) -> Result<ActiveFallback, ResilienceError> {
        Ok(self.fallback.activate(strategy_id, service, reason).await?)
    }

    pub async fn recover_service(&self, service: &ServiceKey) -> bool {
        self.fallback.recover(service).await
    }

    pub fn status(&self) -> FallbackStatus {
        self.fallback.status(self.config.status_log_tail)
    }

    pub fn add_strategy(&self, strategy: FallbackStrategy) -> Result<(), ResilienceError> {
        Ok(self.fallback.add_strategy(strategy)?)
    }

    pub fn update_strategy(&self, strategy: FallbackStrategy) -> Result<(), ResilienceError> {
        Ok(self.fallback.update_strategy(strategy)?)
    }

    pub fn remove_strategy(&self, id: &str) -> Option<FallbackStrategy> {
        self.fallback.remove_strategy(id)
    }

    pub async fn evaluate_triggers(&self, context: TriggerContext) -> TriggerResult {
        self.triggers.evaluate(context).await
    }

    pub fn add_rule(&self, rule: TriggerRule) -> Result<(), ResilienceError> {
        Ok(self.triggers.add_rule(rule)?)
    }

    pub fn update_rule(
        &self,
        id: &str,
        patch: &TriggerRulePatch,
    ) -> Result<TriggerRule, ResilienceError> {
        Ok(self.triggers.update_rule(id, patch)?)
    }

    pub fn remove_rule(&self, id: &str) -> Option<TriggerRule> {
        self.triggers.remove_rule(id)
    }

    pub fn rules(&self) -> Vec<TriggerRule> {
        self.triggers.rules()
    }

    pub fn service_health(&self, service: &ServiceKey) -> Option<ServiceHealth> {
        self.health.get(service)
    }

    /// Most recent trigger audit entries, newest first.
    pub fn recent_triggers(&self, n: usize) -> Vec<TriggerLogEntry> {
        self.triggers.log().recent(n)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Drop for ResilienceService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
    }
}

/// Builder for [`ResilienceService`].
pub struct ResilienceServiceBuilder {
    config: RuntimeConfig,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    signals: Option<Arc<dyn TriggerSignals>>,
    strategies: Vec<FallbackStrategy>,
    rules: Vec<TriggerRule>,
}

impl ResilienceServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            clock: None,
            executor: None,
            signals: None,
            strategies: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn signals(mut self, signals: Arc<dyn TriggerSignals>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn rule(mut self, rule: TriggerRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add every strategy and rule in a catalog document.
    pub fn catalog(mut self, document: CatalogDocument) -> Self {
        self.strategies.extend(document.strategies);
        self.rules.extend(document.rules);
        self
    }

    /// Build the service. Fails on invalid configuration or malformed
    /// strategies and rules.
    pub fn build(self) -> Result<ResilienceService, ResilienceError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(TracingExecutor));
        let signals = self.signals.unwrap_or_else(|| Arc::new(NoSignals));

        let strategies = FallbackStrategyCatalog::from_strategies(self.strategies)?;
        let rules = TriggerRuleCatalog::from_rules(self.rules, clock.now())?;

        let health = Arc::new(HealthTracker::new(clock.clone()));
        let fallback = FallbackEngine::new(
            health.clone(),
            strategies,
            executor.clone(),
            clock.clone(),
            &self.config,
        );
        let triggers = TriggerEngine::new(rules, executor, signals, clock, &self.config);
        let sweeper = HealthSweeper::new(health.clone(), self.config.sweep_interval);

        Ok(ResilienceService {
            health,
            fallback,
            triggers,
            sweeper,
            config: self.config,
            running: Mutex::new(None),
        })
    }
}

impl Default for ResilienceServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteguard_core::{default_rules, default_strategies};
    use std::time::Duration;

    #[test]
    fn test_builder_rejects_malformed_strategy() {
        let mut strategy = default_strategies().remove(0);
        strategy.conditions.clear();

        let result = ResilienceService::builder().strategy(strategy).build();
        assert!(matches!(result, Err(ResilienceError::Catalog(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = RuntimeConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        let result = ResilienceService::builder().config(config).build();
        assert!(matches!(result, Err(ResilienceError::Config(_))));
    }

    #[test]
    fn test_builder_loads_catalog() {
        let service = ResilienceService::builder()
            .catalog(CatalogDocument::builtin())
            .build()
            .unwrap();
        assert_eq!(service.status().strategies.len(), default_strategies().len());
        assert_eq!(service.rules().len(), default_rules().len());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let service = ResilienceService::builder().build().unwrap();
        assert!(!service.is_running());

        service.start().unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start(), Err(ResilienceError::AlreadyRunning)));

        service.shutdown().await;
        assert!(!service.is_running());

        // Restartable after shutdown, and shutdown is idempotent
        service.start().unwrap();
        service.shutdown().await;
        service.shutdown().await;
    }
}
