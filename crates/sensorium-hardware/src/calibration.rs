//! Per-unit correction of motion readings.
//!
//! Some boards are assembled with a sensor mounted the wrong way round. The
//! correction for such a unit is a set of per-axis scale factors keyed by
//! serial number, looked up once when the device is constructed. Units that
//! are not in the table get the identity transform.

use sensorium_core::constants::INVERTED_GYRO_SERIAL;
use sensorium_core::{Triad, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const UNIT: Vector3 = Vector3::new(1.0, 1.0, 1.0);

/// Per-axis scale factors for the three triads of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub acceleration: Vector3,
    pub angular_rate: Vector3,
    pub magnetic_field: Vector3,
}

impl AxisCalibration {
    pub const IDENTITY: AxisCalibration = AxisCalibration {
        acceleration: UNIT,
        angular_rate: UNIT,
        magnetic_field: UNIT,
    };

    /// Calibration that flips the sign of one angular-rate axis.
    pub fn inverted_angular_rate_axis(axis: usize) -> Self {
        let mut factors = UNIT.to_array();
        if let Some(factor) = factors.get_mut(axis) {
            *factor = -1.0;
        }
        Self {
            angular_rate: Vector3::from_array(factors),
            ..Self::IDENTITY
        }
    }

    pub fn factors(&self, triad: Triad) -> &Vector3 {
        match triad {
            Triad::Acceleration => &self.acceleration,
            Triad::AngularRate => &self.angular_rate,
            Triad::MagneticField => &self.magnetic_field,
        }
    }

    /// Apply the factor of one axis of `triad` to a freshly read value.
    pub fn apply(&self, triad: Triad, axis: usize, raw: f64) -> f64 {
        self.factors(triad)
            .axis(axis)
            .map_or(raw, |factor| raw * factor)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Calibrations keyed by serial number.
///
/// # Examples
///
/// ```
/// use sensorium_hardware::calibration::{AxisCalibration, CalibrationTable};
///
/// let mut table = CalibrationTable::new();
/// table.insert(1234, AxisCalibration::inverted_angular_rate_axis(0));
///
/// assert!(!table.lookup(1234).is_identity());
/// assert!(table.lookup(9999).is_identity());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    entries: BTreeMap<i32, AxisCalibration>,
}

impl CalibrationTable {
    /// Empty table: every unit gets the identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the catalogued units known to need a correction.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(
            INVERTED_GYRO_SERIAL,
            AxisCalibration::inverted_angular_rate_axis(2),
        );
        table
    }

    /// Add or replace the calibration of a unit.
    pub fn insert(&mut self, serial_number: i32, calibration: AxisCalibration) {
        self.entries.insert(serial_number, calibration);
    }

    pub fn remove(&mut self, serial_number: i32) -> Option<AxisCalibration> {
        self.entries.remove(&serial_number)
    }

    /// Calibration for a unit, identity when it is not catalogued.
    pub fn lookup(&self, serial_number: i32) -> AxisCalibration {
        self.entries
            .get(&serial_number)
            .copied()
            .unwrap_or(AxisCalibration::IDENTITY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
