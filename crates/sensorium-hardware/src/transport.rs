//! Native hardware access layer.
//!
//! The [`Transport`] trait is the only boundary the registry and the devices
//! depend on. It mirrors the primitives of a vendor access library: handles
//! come out of enumeration, sessions come out of `open`, and every typed
//! accessor addresses a session.
//!
//! Implementations own all local/remote connection details and any
//! synchronization they need; the core calls them from a single thread.
//!
//! # Blocking
//!
//! `attached_handles`, `open` and `wait_for_attach` may block the calling
//! thread. `wait_for_attach` must honour its timeout and return
//! [`HardwareError::Timeout`](crate::HardwareError::Timeout) when it expires.
//!
//! # Errors
//!
//! Accessors report a sample that is momentarily missing with
//! [`HardwareError::Unavailable`](crate::HardwareError::Unavailable), a refused
//! setting with
//! [`HardwareError::ConfigurationRejected`](crate::HardwareError::ConfigurationRejected),
//! and anything else with
//! [`HardwareError::Fault`](crate::HardwareError::Fault).

use crate::error::Result;
use sensorium_core::{ChannelKind, Handle, OpenMode, Session, Triad};
use std::sync::Arc;
use std::time::Duration;

/// Shared transport reference held by the registry and by every device.
pub type SharedTransport = Arc<dyn Transport>;

/// Native hardware access layer.
///
/// The trait is object safe so that the registry can hold any implementation
/// behind a [`SharedTransport`].
pub trait Transport: Send + Sync {
    // ------------------------------------------------------------------
    // Manager level
    // ------------------------------------------------------------------

    /// Snapshot of the handles currently attached.
    fn attached_handles(&self) -> Result<Vec<Handle>>;

    /// Vendor kind code of an enumerated device.
    fn device_kind_code(&self, handle: Handle) -> Result<u32>;

    /// Open an enumerated device and return a session for it.
    ///
    /// Returns `HardwareError::Contention` when the device is already claimed.
    fn open(&self, handle: Handle, mode: &OpenMode) -> Result<Session>;

    /// Block until the opened device is attached, for at most `timeout`.
    fn wait_for_attach(&self, session: Session, timeout: Duration) -> Result<()>;

    /// Close an opened session.
    fn close(&self, session: Session) -> Result<()>;

    /// Release the resources of a closed session.
    fn delete(&self, session: Session) -> Result<()>;

    /// Version string of the native library.
    fn library_version(&self) -> Result<String>;

    /// Human readable description of a native error code.
    fn error_description(&self, code: i32) -> Result<String>;

    /// Whether the remote server is reachable. Local transports report `true`.
    fn server_connected(&self) -> Result<bool>;

    // ------------------------------------------------------------------
    // Common device accessors
    // ------------------------------------------------------------------

    fn device_name(&self, session: Session) -> Result<String>;

    fn serial_number(&self, session: Session) -> Result<i32>;

    fn device_version(&self, session: Session) -> Result<i32>;

    fn device_type_name(&self, session: Session) -> Result<String>;

    fn is_attached(&self, session: Session) -> Result<bool>;

    fn label(&self, session: Session) -> Result<String>;

    fn set_label(&self, session: Session, label: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Motion accessors
    // ------------------------------------------------------------------

    /// Number of axes (0-3) the device provides for a triad.
    fn axis_count(&self, session: Session, triad: Triad) -> Result<usize>;

    fn axis_min(&self, session: Session, triad: Triad, axis: usize) -> Result<f64>;

    fn axis_max(&self, session: Session, triad: Triad, axis: usize) -> Result<f64>;

    /// Current value of one axis.
    fn read_axis(&self, session: Session, triad: Triad, axis: usize) -> Result<f64>;

    /// Effective data rate in milliseconds.
    fn data_rate(&self, session: Session) -> Result<u32>;

    fn set_data_rate(&self, session: Session, rate_ms: u32) -> Result<()>;

    /// Re-zero the gyroscope. The device must be still while this runs.
    fn zero_gyro(&self, session: Session) -> Result<()>;

    // ------------------------------------------------------------------
    // Thermal accessors
    // ------------------------------------------------------------------

    /// Number of physically present thermocouple inputs.
    fn input_count(&self, session: Session) -> Result<usize>;

    fn channel_kind(&self, session: Session, index: usize) -> Result<ChannelKind>;

    fn set_channel_kind(&self, session: Session, index: usize, kind: ChannelKind) -> Result<()>;

    /// Temperature range in Celsius for the channel's current classification.
    fn temperature_range(&self, session: Session, index: usize) -> Result<(f64, f64)>;

    /// Raw potential range in millivolts.
    fn potential_range(&self, session: Session, index: usize) -> Result<(f64, f64)>;

    fn temperature(&self, session: Session, index: usize) -> Result<f64>;

    fn potential(&self, session: Session, index: usize) -> Result<f64>;

    /// Board temperature in Celsius.
    fn ambient_temperature(&self, session: Session) -> Result<f64>;

    fn ambient_range(&self, session: Session) -> Result<(f64, f64)>;
}
