//! Subcommand implementations.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use noteguard_core::{CallOutcome, CatalogDocument, ManualClock, ServiceKey, TriggerContext};
use noteguard_runtime::{
    FallbackStatus, MetadataSignals, ResilienceService, RuntimeConfig, TracingExecutor,
};

use crate::OutputFormat;

/// One recorded call in an outcome file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutcomeEvent {
    pub service: ServiceKey,

    #[serde(flatten)]
    pub outcome: CallOutcome,

    /// Advance the simulated clock before applying this outcome
    #[serde(default)]
    pub advance_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SimulationStep {
    step: usize,
    service: ServiceKey,
    success: bool,
    should_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    strategy: Option<String>,
    newly_activated: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    steps: Vec<SimulationStep>,
    status: FallbackStatus,
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    catalog: String,
    strategies: Vec<String>,
    rules: Vec<String>,
}

pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<CatalogDocument> {
    match path {
        Some(path) => CatalogDocument::from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => Ok(CatalogDocument::builtin()),
    }
}

/// Read a YAML or JSON document, chosen by file extension.
fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_document(&content, is_json(path))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_document<T: DeserializeOwned>(content: &str, json: bool) -> Result<T> {
    if json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    println!("{}", render(value, format)?);
    Ok(())
}

fn build_service(
    config: RuntimeConfig,
    catalog: CatalogDocument,
    clock: Arc<ManualClock>,
) -> Result<ResilienceService> {
    Ok(ResilienceService::builder()
        .config(config)
        .catalog(catalog)
        .clock(clock)
        .executor(Arc::new(TracingExecutor))
        .signals(Arc::new(MetadataSignals))
        .build()?)
}

pub fn validate(catalog: &Path, format: OutputFormat) -> Result<()> {
    let document = CatalogDocument::from_file(catalog)
        .with_context(|| format!("Catalog {} is invalid", catalog.display()))?;

    let summary = ValidationSummary {
        catalog: catalog.display().to_string(),
        strategies: document.strategies.iter().map(|s| s.id.clone()).collect(),
        rules: document.rules.iter().map(|r| r.id.clone()).collect(),
    };
    emit(&summary, format)
}

pub async fn simulate(
    config: RuntimeConfig,
    catalog: Option<&Path>,
    outcomes: &Path,
    format: OutputFormat,
) -> Result<()> {
    let events: Vec<OutcomeEvent> = load_document(outcomes)?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = build_service(config, load_catalog(catalog)?, clock.clone())?;

    let mut steps = Vec::with_capacity(events.len());
    for (index, event) in events.into_iter().enumerate() {
        if let Some(ms) = event.advance_ms {
            clock.advance(Duration::from_millis(ms));
        }

        // Failures are recorded by the evaluation itself.
        if event.outcome.success {
            service.report_outcome(&event.service, &event.outcome);
        }
        let decision = service
            .evaluate_fallback(&event.service, &event.outcome)
            .await;

        steps.push(SimulationStep {
            step: index + 1,
            service: event.service,
            success: event.outcome.success,
            should_fallback: decision.should_fallback,
            strategy: decision.strategy.map(|s| s.id),
            newly_activated: decision.newly_activated,
        });
    }

    let report = SimulationReport {
        steps,
        status: service.status(),
    };
    emit(&report, format)
}

pub async fn trigger(
    config: RuntimeConfig,
    catalog: Option<&Path>,
    context: &Path,
    format: OutputFormat,
) -> Result<()> {
    let context: TriggerContext = load_document(context)?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = build_service(config, load_catalog(catalog)?, clock)?;

    let result = service.evaluate_triggers(context).await;
    emit(&result, format)
}

pub fn recommend(
    config: RuntimeConfig,
    catalog: Option<&Path>,
    outcomes: &Path,
    original: &str,
    exclude: &[String],
    format: OutputFormat,
) -> Result<()> {
    let original: ServiceKey = original
        .parse()
        .with_context(|| format!("Invalid service '{original}'"))?;
    let events: Vec<OutcomeEvent> = load_document(outcomes)?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = build_service(config, load_catalog(catalog)?, clock.clone())?;

    for event in &events {
        if let Some(ms) = event.advance_ms {
            clock.advance(Duration::from_millis(ms));
        }
        service.report_outcome(&event.service, &event.outcome);
    }

    let ranked = service.recommend_services(&original, exclude);
    emit(&ranked, format)
}
