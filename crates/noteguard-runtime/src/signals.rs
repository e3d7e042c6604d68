//! Measurements trigger conditions cannot derive from a note alone.

use async_trait::async_trait;
use serde_json::Value;

use noteguard_core::{SignalKind, TriggerContext};

/// Supplies batch size, cost estimates, sentiment and concept counts.
///
/// Returning `None` means the measurement is unavailable; the condition
/// that asked for it evaluates false.
#[async_trait]
pub trait TriggerSignals: Send + Sync {
    async fn signal(&self, kind: SignalKind, context: &TriggerContext) -> Option<f64>;
}

/// No signals available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

#[async_trait]
impl TriggerSignals for NoSignals {
    async fn signal(&self, _kind: SignalKind, _context: &TriggerContext) -> Option<f64> {
        None
    }
}

/// Reads signals from the context's metadata (`batch_size`,
/// `cost_estimate`, `sentiment`, `concept_count`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataSignals;

impl MetadataSignals {
    pub fn key(kind: SignalKind) -> &'static str {
        match kind {
            SignalKind::BatchSize => "batch_size",
            SignalKind::CostEstimate => "cost_estimate",
            SignalKind::Sentiment => "sentiment",
            SignalKind::ConceptCount => "concept_count",
        }
    }
}

#[async_trait]
impl TriggerSignals for MetadataSignals {
    async fn signal(&self, kind: SignalKind, context: &TriggerContext) -> Option<f64> {
        context.metadata.get(Self::key(kind)).and_then(Value::as_f64)
    }
}
