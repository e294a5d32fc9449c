//! Periodic poll driver.
//!
//! The registry itself never schedules anything: every cycle is an explicit
//! [`DeviceRegistry::poll`] call. [`PollDriver`] supplies the cadence by
//! polling on a fixed [`tokio::time::interval`] until a shutdown signal
//! arrives on a [`tokio::sync::watch`] channel.
//!
//! A poll blocks for as long as its attach waits and listener callbacks
//! take, so each one runs on tokio's blocking pool with the driver moved
//! into it and back out. Listener callbacks run on that pool thread. A tick
//! that falls behind is skipped rather than queued.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensorium_hardware::driver::{PollDriver, PollDriverConfig};
//! use sensorium_hardware::mock::MockTransport;
//! use sensorium_hardware::{DeviceRegistry, RegistryConfig};
//! use tokio::sync::watch;
//!
//! # async fn run() -> sensorium_hardware::Result<()> {
//! let registry = DeviceRegistry::new(Arc::new(MockTransport::new()), RegistryConfig::default())?;
//! let driver = PollDriver::new(registry, PollDriverConfig::default());
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     shutdown_tx.send(true).ok();
//! });
//!
//! let driver = driver.run(shutdown_rx).await?;
//! println!("{} ticks", driver.stats().ticks);
//! # Ok(())
//! # }
//! ```

use crate::error::{HardwareError, Result};
use crate::registry::DeviceRegistry;
use crate::types::PollReport;
use sensorium_core::constants::{DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration of a [`PollDriver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollDriverConfig {
    /// Time between two polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollDriverConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollDriverConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Effective interval, never shorter than [`MIN_POLL_INTERVAL_MS`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// Running totals over the lifetime of a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    pub ticks: u64,
    pub enumeration_failures: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub changes: u64,
    pub device_failures: u64,
}

impl DriverStats {
    fn record(&mut self, report: &PollReport) {
        self.connects += report.connected.len() as u64;
        self.disconnects += report.disconnected.len() as u64;
        self.changes += report.changed.len() as u64;
        self.device_failures += report.failures.len() as u64;
    }
}

/// Polls a registry on a fixed interval.
#[derive(Debug)]
pub struct PollDriver {
    registry: DeviceRegistry,
    config: PollDriverConfig,
    stats: DriverStats,
}

impl PollDriver {
    pub fn new(registry: DeviceRegistry, config: PollDriverConfig) -> Self {
        Self {
            registry,
            config,
            stats: DriverStats::default(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &PollDriverConfig {
        &self.config
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Release the registry, for example to shut it down explicitly.
    pub fn into_registry(self) -> DeviceRegistry {
        self.registry
    }

    /// Run one poll and fold its report into the stats.
    ///
    /// Returns `None` when the cycle failed as a whole.
    pub fn tick(&mut self) -> Option<PollReport> {
        self.stats.ticks += 1;

        match self.registry.poll() {
            Ok(report) => {
                self.stats.record(&report);
                for failure in &report.failures {
                    debug!(handle = %failure.handle, error = %failure.error, "device failure");
                }
                Some(report)
            }
            Err(e) => {
                self.stats.enumeration_failures += 1;
                warn!(error = %e, "poll cycle failed");
                None
            }
        }
    }

    /// Poll until `shutdown` turns `true` or its sender is dropped, then
    /// hand the driver back.
    ///
    /// The first poll runs immediately.
    ///
    /// # Errors
    /// `PollTask` when a poll panicked. The registry is dropped with the
    /// failed task, which releases its sessions.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<Self> {
        let period = self.config.interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.config.interval_ms, "poll driver started");

        let mut driver = self;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender dropped");
                        break;
                    }
                }
                _ = interval.tick() => {
                    driver = tokio::task::spawn_blocking(move || {
                        driver.tick();
                        driver
                    })
                    .await
                    .map_err(|e| {
                        error!(error = %e, "poll task failed");
                        HardwareError::poll_task(e.to_string())
                    })?;
                }
            }
        }

        info!(ticks = driver.stats.ticks, "poll driver stopped");
        Ok(driver)
    }
}
