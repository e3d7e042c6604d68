//! # noteguard-runtime
//!
//! Async engines for the Noteguard resilience layer.
//!
//! `noteguard-core` holds the deterministic model: health records,
//! strategy and rule catalogs, condition evaluation and scoring. This crate
//! puts it to work:
//!
//! - [`FallbackEngine`] decides when a failing service is rerouted and runs
//!   the strategy's actions under a timeout
//! - [`TriggerEngine`] matches note changes against trigger rules and
//!   dispatches their actions
//! - [`HealthSweeper`] refreshes health records on a fixed interval until
//!   shut down
//! - [`ResilienceService`] wires the three together behind one API
//!
//! Side effects never happen here directly. Every action becomes an
//! [`ActionCommand`] handed to an [`ActionExecutor`] supplied by the host.
//!
//! ## Example
//!
//! ```rust,no_run
//! use noteguard_core::{CallOutcome, CatalogDocument, ServiceKey};
//! use noteguard_runtime::ResilienceService;
//!
//! # async fn run() -> Result<(), noteguard_runtime::ResilienceError> {
//! let service = ResilienceService::builder()
//!     .catalog(CatalogDocument::builtin())
//!     .build()?;
//! service.start()?;
//!
//! let key = ServiceKey::new("openai", "gpt-4o");
//! let decision = service
//!     .evaluate_fallback(&key, &CallOutcome::failure("upstream timeout"))
//!     .await;
//! if decision.should_fallback {
//!     let alternatives = service.recommend_services(&key, &[]);
//!     println!("{alternatives:?}");
//! }
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod resilience;
pub mod service;
pub mod signals;
pub mod triggers;

use thiserror::Error;

use noteguard_core::CatalogError;

pub use config::{ConfigError, RuntimeConfig};
pub use executor::{
    execute_with_timeout, ActionCommand, ActionError, ActionExecutor, ActionOutput,
    TracingExecutor, TriggerCommand, TriggerInvocation,
};
pub use resilience::{FallbackDecision, FallbackEngine, FallbackStatus, HealthSweeper};
pub use service::{ResilienceService, ResilienceServiceBuilder};
pub use signals::{MetadataSignals, NoSignals, TriggerSignals};
pub use triggers::TriggerEngine;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Invalid runtime configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Health sweep already running")]
    AlreadyRunning,
}
