//! Per-service health tracking.
//!
//! Every reported call outcome updates the record for its service key.
//! Records are created lazily on first report and never removed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::types::{CallOutcome, ServiceKey};

/// Consecutive failures at which the error rate saturates at 1.0.
pub const ERROR_RATE_SATURATION: u32 = 10;

/// Health snapshot for a single service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: ServiceKey,
    pub available: bool,
    pub response_time_ms: f64,

    /// Always `min(1, consecutive_failures / 10)`
    pub error_rate: f64,

    pub consecutive_failures: u32,

    /// Accumulated cost reported for this service
    #[serde(default)]
    pub cost_usd: f64,

    pub last_check: DateTime<Utc>,

    #[serde(default)]
    pub last_error: Option<String>,
}

impl ServiceHealth {
    /// A healthy record with no history.
    pub fn new(service: ServiceKey, now: DateTime<Utc>) -> Self {
        Self {
            service,
            available: true,
            response_time_ms: 0.0,
            error_rate: 0.0,
            consecutive_failures: 0,
            cost_usd: 0.0,
            last_check: now,
            last_error: None,
        }
    }

    /// Apply a call outcome.
    pub fn apply(&mut self, outcome: &CallOutcome, now: DateTime<Utc>) {
        if outcome.success {
            self.available = true;
            self.consecutive_failures = 0;
            self.last_error = None;
        } else {
            self.available = false;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_error = Some(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            );
        }

        if let Some(latency) = outcome.latency_ms.filter(|l| l.is_finite() && *l >= 0.0) {
            self.response_time_ms = latency;
        }

        if let Some(cost) = outcome.cost_usd.filter(|c| c.is_finite() && *c > 0.0) {
            self.cost_usd += cost;
        }

        self.recompute_error_rate();
        self.last_check = now;
    }

    fn recompute_error_rate(&mut self) {
        self.error_rate = error_rate_for(self.consecutive_failures);
    }
}

/// The decaying error-rate proxy.
pub fn error_rate_for(consecutive_failures: u32) -> f64 {
    (f64::from(consecutive_failures) / f64::from(ERROR_RATE_SATURATION)).min(1.0)
}

/// Tracks health for every service that has reported an outcome.
pub struct HealthTracker {
    services: DashMap<ServiceKey, ServiceHealth>,
    clock: Arc<dyn Clock>,
}

impl HealthTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            services: DashMap::new(),
            clock,
        }
    }

    /// Record a call outcome, creating the record on first report.
    pub fn report(&self, service: &ServiceKey, outcome: &CallOutcome) {
        let now = self.clock.now();
        let mut entry = self
            .services
            .entry(service.clone())
            .or_insert_with(|| ServiceHealth::new(service.clone(), now));
        entry.apply(outcome, now);

        if outcome.is_failure() {
            tracing::debug!(
                service = %service,
                consecutive_failures = entry.consecutive_failures,
                error_rate = entry.error_rate,
                "Service call failed"
            );
        }
    }

    /// Current health for a service, if it has ever reported.
    pub fn get(&self, service: &ServiceKey) -> Option<ServiceHealth> {
        self.services.get(service).map(|entry| entry.value().clone())
    }

    /// Clear failure state after a recovery.
    ///
    /// Returns false when the service has never reported.
    pub fn reset_failures(&self, service: &ServiceKey) -> bool {
        let now = self.clock.now();
        match self.services.get_mut(service) {
            Some(mut entry) => {
                entry.consecutive_failures = 0;
                entry.last_error = None;
                entry.recompute_error_rate();
                entry.last_check = now;
                true
            }
            None => false,
        }
    }

    /// Refresh `last_check` on every record. Returns the number of records touched.
    pub fn touch_all(&self) -> usize {
        let now = self.clock.now();
        let mut touched = 0;
        for mut entry in self.services.iter_mut() {
            entry.last_check = now;
            touched += 1;
        }
        touched
    }

    /// All records, sorted by service key.
    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let mut all: Vec<ServiceHealth> = self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
