//! Core constants for device reconciliation and polling.
//!
//! This module centralizes the vendor codes, capability limits and timing
//! defaults shared by the registry, the device kinds and the poll driver.
//!
//! # Usage
//!
//! ```
//! use sensorium_core::constants::*;
//! use std::time::Duration;
//!
//! // Axis counts reported by the hardware must fit in a triad
//! fn validate_axis_count(count: usize) -> bool {
//!     count <= MAX_AXES
//! }
//!
//! let timeout = Duration::from_millis(DEFAULT_ATTACH_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 1);
//! ```

// ============================================================================
// Vendor Device Kind Codes
// ============================================================================

/// Vendor code reported for the combined accelerometer/gyroscope/compass board.
///
/// The registry maps this code to the motion device constructor.
pub const KIND_CODE_MOTION: u32 = 0x033;

/// Vendor code reported for the thermocouple interface board.
///
/// The registry maps this code to the thermal device constructor.
pub const KIND_CODE_THERMAL: u32 = 0x070;

// ============================================================================
// Capability Limits
// ============================================================================

/// Maximum number of axes in one measurement triad.
///
/// Acceleration, angular rate and magnetic field are each reported on at
/// most three axes. A device reporting more violates its contract.
pub const MAX_AXES: usize = 3;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Default bound on the wait for hardware attachment after opening a device (ms).
///
/// A device already claimed by another process never attaches; this bound
/// turns that situation into a typed timeout instead of a hang.
///
/// # Examples
///
/// ```
/// use sensorium_core::constants::DEFAULT_ATTACH_TIMEOUT_MS;
/// use std::time::Duration;
///
/// let timeout = Duration::from_millis(DEFAULT_ATTACH_TIMEOUT_MS);
/// assert_eq!(timeout, Duration::from_secs(1));
/// ```
pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 1000;

/// Default interval between two reconciliation ticks of the poll driver (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Smallest poll interval accepted by the poll driver (ms).
///
/// Prevents a misconfigured driver from busy-looping on the transport.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Calibration Catalogue
// ============================================================================

/// Serial number of the catalogued motion board whose gyroscope is mounted
/// upside down on its carrier.
///
/// The built-in calibration table flips the sign of its angular-rate Z axis.
pub const INVERTED_GYRO_SERIAL: i32 = 165_536;
