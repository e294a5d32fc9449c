//! Registry configuration.
//!
//! # Examples
//!
//! ```
//! use sensorium_hardware::config::RegistryConfig;
//!
//! let config = RegistryConfig::from_json_str(
//!     r#"{ "open_mode": { "mode": "remote_by_address", "address": "10.0.0.5", "port": 5001, "password": "" },
//!          "attach_timeout_ms": 250 }"#,
//! )
//! .unwrap();
//!
//! assert!(!config.open_mode.is_local());
//! assert_eq!(config.attach_timeout().as_millis(), 250);
//! ```

use crate::calibration::CalibrationTable;
use crate::error::Result;
use sensorium_core::constants::DEFAULT_ATTACH_TIMEOUT_MS;
use sensorium_core::{Error, OpenMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of a [`DeviceRegistry`](crate::registry::DeviceRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How the transport opens newly enumerated devices.
    pub open_mode: OpenMode,

    /// Bound on the wait for attachment after opening a device.
    pub attach_timeout_ms: u64,

    /// Per-serial-number corrections applied to motion devices.
    pub calibration: CalibrationTable,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            open_mode: OpenMode::Local,
            attach_timeout_ms: DEFAULT_ATTACH_TIMEOUT_MS,
            calibration: CalibrationTable::builtin(),
        }
    }
}

impl RegistryConfig {
    /// Parse and validate a JSON configuration. Missing keys take defaults.
    ///
    /// # Errors
    /// Returns `Error::Config` for malformed JSON or a zero attach timeout.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values a registry cannot work with.
    ///
    /// # Errors
    /// Returns `Error::Config` when the attach timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.attach_timeout_ms == 0 {
            return Err(Error::Config("attach_timeout_ms must be greater than zero".into()).into());
        }
        Ok(())
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    /// Replace the open mode.
    pub fn with_open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    /// Replace the attach timeout.
    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replace the calibration table.
    pub fn with_calibration(mut self, calibration: CalibrationTable) -> Self {
        self.calibration = calibration;
        self
    }
}
