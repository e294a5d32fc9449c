//! Error types for transport and device operations.
//!
//! The variants follow how a failure is handled rather than where it comes
//! from: configuration rejections are reported back to the caller, transient
//! unavailability is absorbed locally by the device that saw it, attach
//! timeouts and contention fail a single device add, and faults describe a
//! native call that broke its contract.

use sensorium_core::Handle;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during transport and device operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    /// The hardware refused a requested setting.
    #[error("Configuration rejected for {setting}: {message}")]
    ConfigurationRejected { setting: String, message: String },

    /// A single sample could not be read this time.
    #[error("Value unavailable: {call}")]
    Unavailable { call: String },

    /// Transport-level wait exceeded its bound.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A newly opened device did not attach within the configured bound.
    #[error("Device {handle} did not attach within {timeout_ms}ms")]
    AttachTimeout { handle: Handle, timeout_ms: u64 },

    /// The device is already claimed by another manager or process.
    #[error("Device {handle} is claimed by another client")]
    Contention { handle: Handle },

    /// A native call violated its documented contract.
    #[error("Native call {call} failed on {target} (code {code})")]
    Fault {
        target: String,
        call: String,
        code: i32,
    },

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Lookup of a device, channel or listener found nothing.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// `poll()` was called while another poll was still running.
    #[error("A poll cycle is already in progress")]
    PollInProgress,

    /// A poll run on the blocking pool did not complete.
    #[error("Poll task failed: {message}")]
    PollTask { message: String },

    /// Invalid value at the type level.
    #[error(transparent)]
    Core(#[from] sensorium_core::Error),
}

impl HardwareError {
    /// Create a new configuration rejected error.
    pub fn rejected(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationRejected {
            setting: setting.into(),
            message: message.into(),
        }
    }

    /// Create a new transient unavailability error.
    pub fn unavailable(call: impl Into<String>) -> Self {
        Self::Unavailable { call: call.into() }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new attach timeout error.
    pub fn attach_timeout(handle: Handle, timeout_ms: u64) -> Self {
        Self::AttachTimeout { handle, timeout_ms }
    }

    /// Create a new contention error.
    pub fn contention(handle: Handle) -> Self {
        Self::Contention { handle }
    }

    /// Create a new fault for a native call on a handle or session.
    pub fn fault(target: impl ToString, call: impl Into<String>, code: i32) -> Self {
        Self::Fault {
            target: target.to_string(),
            call: call.into(),
            code,
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new poll task error.
    pub fn poll_task(message: impl Into<String>) -> Self {
        Self::PollTask {
            message: message.into(),
        }
    }

    /// Whether the failure only concerns the current sample.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
