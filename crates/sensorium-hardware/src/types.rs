//! Common types shared across the registry and the device kinds.

use crate::error::HardwareError;
use sensorium_core::Handle;
use serde::{Deserialize, Serialize};

/// Static identity of a device.
///
/// Queried once when the device is constructed and never re-fetched, so it
/// stays readable after the hardware is gone (for example inside a
/// disconnect notification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Display name reported by the hardware.
    pub name: String,

    /// Vendor serial number.
    pub serial_number: i32,

    /// Firmware version.
    pub version: i32,

    /// Vendor kind name (e.g., "Spatial").
    pub type_name: String,
}

impl DeviceInfo {
    /// Create a new DeviceInfo.
    pub fn new(
        name: impl Into<String>,
        serial_number: i32,
        version: i32,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            serial_number,
            version,
            type_name: type_name.into(),
        }
    }
}

/// Outcome of one device add or update that failed during a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollFailure {
    /// Device the failure belongs to.
    pub handle: Handle,

    /// What went wrong.
    pub error: HardwareError,
}

/// Summary of one reconciliation and update cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    /// Handles whose devices were constructed and inserted, in order.
    pub connected: Vec<Handle>,

    /// Handles whose devices were erased and released, in order.
    pub disconnected: Vec<Handle>,

    /// Handles whose devices reported a changed measure.
    pub changed: Vec<Handle>,

    /// Handles skipped because the registry has no constructor for their kind.
    pub ignored: Vec<Handle>,

    /// Per-device failures. None of them aborted the cycle.
    pub failures: Vec<PollFailure>,
}

impl PollReport {
    /// Whether the cycle produced neither connects, disconnects nor changes.
    pub fn is_quiet(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty() && self.changed.is_empty()
    }

    pub(crate) fn fail(&mut self, handle: Handle, error: HardwareError) {
        self.failures.push(PollFailure { handle, error });
    }
}
