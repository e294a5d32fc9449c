//! Device registry for polled sensor hardware.
//!
//! This crate keeps a live set of sensor devices in sync with what a native
//! access layer reports as attached, polls each device for fresh readings,
//! and notifies listeners when devices connect, disconnect or change.
//!
//! # Layers
//!
//! - **Transport**: the [`Transport`] trait wraps the vendor access library.
//!   It enumerates handles, opens sessions and exposes typed accessors.
//!   [`mock::MockTransport`] implements it over simulated boards.
//! - **Devices**: a [`Device`] is either a [`MotionSensor`] (accelerometer,
//!   gyroscope, compass) or a [`ThermalSensor`] (thermocouple channels and an
//!   ambient sensor). Each caches its last measure and notifies its
//!   [`DeviceListener`]s when a poll finds a different one.
//! - **Registry**: [`DeviceRegistry::poll`] reconciles the device set against
//!   the enumeration, then updates every device. [`RegistryListener`]s hear
//!   about connects and disconnects.
//! - **Driver**: [`driver::PollDriver`] calls `poll` on a fixed interval on a
//!   Tokio task until told to stop.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sensorium_core::Handle;
//! use sensorium_hardware::mock::{MockDevice, MockTransport};
//! use sensorium_hardware::{DeviceRegistry, RegistryConfig, RegistryListener};
//!
//! struct Logger;
//!
//! impl RegistryListener for Logger {
//!     fn on_device_connected(&self, registry: &mut DeviceRegistry, handle: Handle) {
//!         if let Some(device) = registry.device(handle) {
//!             println!("connected: {device}");
//!         }
//!     }
//! }
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.plug(MockDevice::motion(1001));
//! transport.plug(MockDevice::thermal(2002, 4));
//!
//! let mut registry = DeviceRegistry::new(transport, RegistryConfig::default())?;
//! registry.add_listener(Arc::new(Logger));
//!
//! let report = registry.poll()?;
//! assert_eq!(report.connected.len(), 2);
//! # Ok::<(), sensorium_hardware::HardwareError>(())
//! ```
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] with the
//! [`HardwareError`] type. A poll only fails as a whole when enumeration
//! fails or when it is re-entered from a callback; every per-device failure
//! is collected in the returned [`PollReport`].
//!
//! # Threading
//!
//! A registry is driven from one thread or task. The transport and all
//! listeners are `Send + Sync`, so the whole registry can be moved into the
//! task that drives it.

pub mod calibration;
pub mod config;
pub mod devices;
pub mod driver;
pub mod error;
pub mod listener;
pub mod mock;
pub mod motion;
pub mod registry;
pub mod thermal;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use calibration::{AxisCalibration, CalibrationTable};
pub use config::RegistryConfig;
pub use devices::{Device, DeviceCore};
pub use error::{HardwareError, Result};
pub use listener::{DeviceListener, ListenerList, RegistryListener};
pub use motion::{AxisCounts, MotionMeasure, MotionSensor};
pub use registry::DeviceRegistry;
pub use thermal::{Channel, ChannelMeasure, ThermalSensor};
pub use transport::{SharedTransport, Transport};
pub use types::{DeviceInfo, PollFailure, PollReport};

// Re-export driver types
pub use driver::{DriverStats, PollDriver, PollDriverConfig};
