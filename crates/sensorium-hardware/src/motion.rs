//! Accelerometer, gyroscope and compass boards.
//!
//! A motion board exposes up to three axes for each [`Triad`]. Axis counts,
//! per-axis bounds and the data rate are read once at construction; the
//! bounds are kept as the hardware reports them and are never calibrated.
//!
//! On each update the three triads are read in order:
//!
//! * acceleration: a sample that is momentarily unavailable skips the whole
//!   tick, leaving the cached measure untouched; any other error fails it.
//! * angular rate: any error fails the tick.
//! * magnetic field: an axis that is momentarily unavailable keeps its
//!   previous value; any other error fails the tick.
//!
//! Axes past a triad's count stay at zero. Calibration factors apply to
//! freshly read values only.

use crate::calibration::AxisCalibration;
use crate::devices::DeviceCore;
use crate::error::{HardwareError, Result};
use sensorium_core::constants::MAX_AXES;
use sensorium_core::{Error, Triad, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// One reading of all three triads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionMeasure {
    pub acceleration: Vector3,
    pub angular_rate: Vector3,
    pub magnetic_field: Vector3,
}

impl MotionMeasure {
    pub const fn new(acceleration: Vector3, angular_rate: Vector3, magnetic_field: Vector3) -> Self {
        Self {
            acceleration,
            angular_rate,
            magnetic_field,
        }
    }

    pub fn triad(&self, triad: Triad) -> Vector3 {
        match triad {
            Triad::Acceleration => self.acceleration,
            Triad::AngularRate => self.angular_rate,
            Triad::MagneticField => self.magnetic_field,
        }
    }

    fn set_triad(&mut self, triad: Triad, values: Vector3) {
        match triad {
            Triad::Acceleration => self.acceleration = values,
            Triad::AngularRate => self.angular_rate = values,
            Triad::MagneticField => self.magnetic_field = values,
        }
    }
}

impl fmt::Display for MotionMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acceleration:({}) angular_rate:({}) magnetic_field:({})",
            self.acceleration, self.angular_rate, self.magnetic_field
        )
    }
}

/// Number of axes the board provides per triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisCounts {
    pub acceleration: usize,
    pub angular_rate: usize,
    pub magnetic_field: usize,
}

impl AxisCounts {
    pub fn get(&self, triad: Triad) -> usize {
        match triad {
            Triad::Acceleration => self.acceleration,
            Triad::AngularRate => self.angular_rate,
            Triad::MagneticField => self.magnetic_field,
        }
    }

    fn set(&mut self, triad: Triad, count: usize) {
        match triad {
            Triad::Acceleration => self.acceleration = count,
            Triad::AngularRate => self.angular_rate = count,
            Triad::MagneticField => self.magnetic_field = count,
        }
    }
}

/// Motion board owned by the registry.
#[derive(Debug)]
pub struct MotionSensor {
    core: DeviceCore,
    axes: AxisCounts,
    calibration: AxisCalibration,
    data_rate_ms: u32,
    measure: MotionMeasure,
    min_measure: MotionMeasure,
    max_measure: MotionMeasure,
}

impl MotionSensor {
    /// Query capabilities and bounds of a freshly attached board.
    ///
    /// # Errors
    /// Fails when a capability query fails or a triad reports more than
    /// three axes.
    pub(crate) fn new(core: DeviceCore, calibration: AxisCalibration) -> Result<Self> {
        let mut axes = AxisCounts::default();
        let mut min_measure = MotionMeasure::default();
        let mut max_measure = MotionMeasure::default();

        for triad in Triad::ALL {
            let count = query_axis_count(&core, triad)?;
            let (min, max) = query_bounds(&core, triad, count)?;
            axes.set(triad, count);
            min_measure.set_triad(triad, min);
            max_measure.set_triad(triad, max);
        }

        let data_rate_ms = core.transport().data_rate(core.session())?;

        debug!(
            session = %core.session(),
            serial = core.info().serial_number,
            acceleration_axes = axes.acceleration,
            angular_rate_axes = axes.angular_rate,
            magnetic_axes = axes.magnetic_field,
            data_rate_ms,
            calibrated = !calibration.is_identity(),
            "motion device constructed"
        );

        Ok(Self {
            core,
            axes,
            calibration,
            data_rate_ms,
            measure: MotionMeasure::default(),
            min_measure,
            max_measure,
        })
    }

    pub(crate) fn core(&self) -> &DeviceCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    /// Latest cached measure.
    pub fn measure(&self) -> &MotionMeasure {
        &self.measure
    }

    /// Lower bounds as reported by the hardware at construction.
    pub fn min_measure(&self) -> &MotionMeasure {
        &self.min_measure
    }

    /// Upper bounds as reported by the hardware at construction.
    pub fn max_measure(&self) -> &MotionMeasure {
        &self.max_measure
    }

    pub fn axis_counts(&self) -> AxisCounts {
        self.axes
    }

    pub fn acceleration_axis_count(&self) -> usize {
        self.axes.acceleration
    }

    pub fn angular_rate_axis_count(&self) -> usize {
        self.axes.angular_rate
    }

    pub fn magnetic_axis_count(&self) -> usize {
        self.axes.magnetic_field
    }

    pub fn calibration(&self) -> &AxisCalibration {
        &self.calibration
    }

    /// Data rate as last reported by the hardware.
    pub fn data_rate_ms(&self) -> u32 {
        self.data_rate_ms
    }

    /// Request a new data rate.
    ///
    /// The effective rate is read back from the hardware after every write
    /// attempt, since the board may clamp or refuse the value. Returns
    /// `false` when the board refused the rate.
    ///
    /// # Errors
    /// Returns transport failures other than a refused setting. The cached
    /// rate is refreshed before a write failure is returned.
    pub fn set_data_rate(&mut self, rate_ms: u32) -> Result<bool> {
        let transport = self.core.transport();
        let session = self.core.session();

        let written = transport.set_data_rate(session, rate_ms);
        self.data_rate_ms = transport.data_rate(session)?;

        match written {
            Ok(()) => Ok(true),
            Err(HardwareError::ConfigurationRejected { message, .. }) => {
                debug!(%session, rate_ms, effective_ms = self.data_rate_ms, %message, "data rate rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-zero the gyroscope. Keep the board still while this runs.
    pub fn zero_gyro(&mut self) -> Result<()> {
        self.core.transport().zero_gyro(self.core.session())
    }

    pub(crate) fn refresh(&mut self) -> Result<bool> {
        let Some(measure) = self.read_measure()? else {
            return Ok(false);
        };

        if measure == self.measure {
            return Ok(false);
        }

        self.measure = measure;
        Ok(true)
    }

    fn read_measure(&self) -> Result<Option<MotionMeasure>> {
        let acceleration = match self.read_triad(Triad::Acceleration, None) {
            Ok(values) => values,
            Err(e) if e.is_transient() => {
                trace!(session = %self.core.session(), error = %e, "acceleration unavailable, skipping tick");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let angular_rate = self.read_triad(Triad::AngularRate, None)?;
        let magnetic_field =
            self.read_triad(Triad::MagneticField, Some(&self.measure.magnetic_field))?;

        Ok(Some(MotionMeasure::new(
            acceleration,
            angular_rate,
            magnetic_field,
        )))
    }

    /// Read every present axis of a triad. With a `fallback`, an axis whose
    /// sample is unavailable keeps the fallback's value.
    fn read_triad(&self, triad: Triad, fallback: Option<&Vector3>) -> Result<Vector3> {
        let transport = self.core.transport();
        let session = self.core.session();
        let mut values = [0.0; MAX_AXES];

        for axis in 0..self.axes.get(triad) {
            values[axis] = match (transport.read_axis(session, triad, axis), fallback) {
                (Ok(raw), _) => self.calibration.apply(triad, axis, raw),
                (Err(e), Some(previous)) if e.is_transient() => {
                    trace!(%session, %triad, axis, "sample unavailable, keeping previous value");
                    previous.axis(axis)?
                }
                (Err(e), _) => return Err(e),
            };
        }

        Ok(Vector3::from_array(values))
    }
}

fn query_axis_count(core: &DeviceCore, triad: Triad) -> Result<usize> {
    let count = core.transport().axis_count(core.session(), triad)?;
    if count > MAX_AXES {
        return Err(Error::AxisCountOutOfRange(count).into());
    }
    Ok(count)
}

fn query_bounds(core: &DeviceCore, triad: Triad, count: usize) -> Result<(Vector3, Vector3)> {
    let transport = core.transport();
    let session = core.session();
    let mut min = [0.0; MAX_AXES];
    let mut max = [0.0; MAX_AXES];

    for axis in 0..count {
        min[axis] = transport.axis_min(session, triad, axis)?;
        max[axis] = transport.axis_max(session, triad, axis)?;
    }

    Ok((Vector3::from_array(min), Vector3::from_array(max)))
}

impl fmt::Display for MotionSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data_rate:{}ms measure:[{}] min:[{}] max:[{}]",
            self.data_rate_ms, self.measure, self.min_measure, self.max_measure
        )
    }
}
