//! Health-driven resilience.
//!
//! This module provides:
//! - The fallback engine (strategy evaluation, cooldowns, recovery,
//!   recommendations)
//! - The periodic health sweep

mod fallback;
mod sweeper;

pub use fallback::{FallbackDecision, FallbackEngine, FallbackStatus};
pub use sweeper::HealthSweeper;
