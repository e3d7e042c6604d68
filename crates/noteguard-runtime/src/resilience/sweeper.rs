//! Periodic health sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use noteguard_core::HealthTracker;

/// Refreshes `last_check` on every tracked service at a fixed interval
/// until told to stop.
pub struct HealthSweeper {
    health: Arc<HealthTracker>,
    sweep_interval: Duration,
}

impl HealthSweeper {
    #[must_use]
    pub fn new(health: Arc<HealthTracker>, sweep_interval: Duration) -> Self {
        Self {
            health,
            sweep_interval,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Run one sweep. Returns the number of records refreshed.
    pub fn sweep_once(&self) -> usize {
        self.health.touch_all()
    }

    /// Spawn the sweep loop. It exits when `shutdown_rx` receives a value or
    /// its sender is dropped.
    #[must_use]
    pub fn start_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let health = self.health.clone();
        let sweep_interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(interval = ?sweep_interval, "Health sweep started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let touched = health.touch_all();
                        tracing::trace!(services = touched, "Health sweep completed");
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Health sweep shutting down");
                        break;
                    }
                }
            }
        })
    }
}
