//! Simulated boards plugged into a [`MockTransport`](super::MockTransport).

use sensorium_core::constants::MAX_AXES;
use sensorium_core::{ChannelKind, DeviceKind, Triad, Vector3};

/// How a simulated board reacts to being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachBehavior {
    /// Opens and attaches at once.
    #[default]
    Immediate,

    /// Opens but never attaches; every attach wait times out.
    Stall,

    /// Already claimed by another client; opening fails with contention.
    Claimed,
}

/// Potential range reported for every thermocouple channel, in millivolts.
pub const POTENTIAL_RANGE_MV: (f64, f64) = (-5.0, 80.0);

/// Temperature range in Celsius for a thermocouple classification.
pub fn temperature_range(kind: ChannelKind) -> (f64, f64) {
    match kind {
        ChannelKind::K => (-270.0, 1372.0),
        ChannelKind::J => (-210.0, 1200.0),
        ChannelKind::E => (-270.0, 1000.0),
        ChannelKind::T => (-270.0, 400.0),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockChannel {
    /// Classification register as the board stores it.
    pub(crate) kind_code: i32,
    pub(crate) temperature_c: f64,
    pub(crate) potential_mv: f64,
}

/// A simulated board.
///
/// # Examples
///
/// ```
/// use sensorium_core::{Triad, Vector3};
/// use sensorium_hardware::mock::{MockDevice, MockTransport};
///
/// let transport = MockTransport::new();
/// let handle = transport.plug(
///     MockDevice::motion(1001)
///         .with_axes(3, 3, 2)
///         .with_axis_values(Triad::Acceleration, Vector3::new(0.0, 0.0, 1.0)),
/// );
/// assert_eq!(transport.plugged(), vec![handle]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MockDevice {
    pub(crate) kind_code: u32,
    pub(crate) name: String,
    pub(crate) serial_number: i32,
    pub(crate) version: i32,
    pub(crate) type_name: String,
    pub(crate) label: String,
    pub(crate) attach: AttachBehavior,

    pub(crate) axis_counts: [usize; 3],
    pub(crate) axis_min: [Vector3; 3],
    pub(crate) axis_max: [Vector3; 3],
    pub(crate) axis_values: [Vector3; 3],
    pub(crate) data_rate_ms: u32,
    pub(crate) supported_data_rates: Vec<u32>,

    pub(crate) channels: Vec<MockChannel>,
    pub(crate) ambient_c: f64,
    pub(crate) ambient_range: (f64, f64),
}

impl MockDevice {
    fn base(kind_code: u32, serial_number: i32, name: String, type_name: &str) -> Self {
        Self {
            kind_code,
            name,
            serial_number,
            version: 100,
            type_name: type_name.to_string(),
            label: String::new(),
            attach: AttachBehavior::Immediate,
            axis_counts: [0; 3],
            axis_min: [Vector3::ZERO; 3],
            axis_max: [Vector3::ZERO; 3],
            axis_values: [Vector3::ZERO; 3],
            data_rate_ms: 0,
            supported_data_rates: Vec::new(),
            channels: Vec::new(),
            ambient_c: 0.0,
            ambient_range: (0.0, 0.0),
        }
    }

    /// Motion board with three axes per triad and typical bounds.
    pub fn motion(serial_number: i32) -> Self {
        let mut device = Self::base(
            DeviceKind::Motion.code(),
            serial_number,
            "Spatial 3/3/3".to_string(),
            "Spatial",
        );
        device.version = 300;
        device.axis_counts = [MAX_AXES; 3];
        device.axis_min = [
            Vector3::new(-8.0, -8.0, -8.0),
            Vector3::new(-2000.0, -2000.0, -2000.0),
            Vector3::new(-5.6, -5.6, -5.6),
        ];
        device.axis_max = [
            Vector3::new(8.0, 8.0, 8.0),
            Vector3::new(2000.0, 2000.0, 2000.0),
            Vector3::new(5.6, 5.6, 5.6),
        ];
        device.data_rate_ms = 8;
        device.supported_data_rates = vec![4, 8, 16, 32, 64, 128, 256, 512, 1000];
        device
    }

    /// Thermocouple board with `inputs` K-type channels reading zero.
    pub fn thermal(serial_number: i32, inputs: usize) -> Self {
        let mut device = Self::base(
            DeviceKind::Thermal.code(),
            serial_number,
            format!("Thermocouple {inputs}-input"),
            "TemperatureSensor",
        );
        device.version = 200;
        device.channels = (0..inputs)
            .map(|_| MockChannel {
                kind_code: ChannelKind::K.code(),
                temperature_c: 0.0,
                potential_mv: 0.0,
            })
            .collect();
        device.ambient_range = (-40.0, 85.0);
        device
    }

    /// Board with a kind code the registry may not support.
    pub fn unknown(kind_code: u32) -> Self {
        Self::base(kind_code, 0, "Unknown board".to_string(), "Unknown")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_attach(mut self, attach: AttachBehavior) -> Self {
        self.attach = attach;
        self
    }

    /// Axis counts for acceleration, angular rate and magnetic field.
    ///
    /// Counts above three are kept so that tests can exercise the
    /// capability check.
    pub fn with_axes(mut self, acceleration: usize, angular_rate: usize, magnetic: usize) -> Self {
        self.axis_counts = [acceleration, angular_rate, magnetic];
        self
    }

    pub fn with_axis_bounds(mut self, triad: Triad, min: Vector3, max: Vector3) -> Self {
        self.axis_min[triad_index(triad)] = min;
        self.axis_max[triad_index(triad)] = max;
        self
    }

    pub fn with_axis_values(mut self, triad: Triad, values: Vector3) -> Self {
        self.axis_values[triad_index(triad)] = values;
        self
    }

    /// Current data rate. The rate is added to the supported list.
    pub fn with_data_rate(mut self, rate_ms: u32) -> Self {
        self.data_rate_ms = rate_ms;
        if !self.supported_data_rates.contains(&rate_ms) {
            self.supported_data_rates.push(rate_ms);
        }
        self
    }

    /// Rates the board accepts; every other write is rejected.
    pub fn with_supported_data_rates(mut self, rates: &[u32]) -> Self {
        self.supported_data_rates = rates.to_vec();
        if !self.supported_data_rates.contains(&self.data_rate_ms) {
            self.supported_data_rates.push(self.data_rate_ms);
        }
        self
    }

    pub fn with_channel_kind(mut self, index: usize, kind: ChannelKind) -> Self {
        self.with_channel_kind_code(index, kind.code())
    }

    /// Store a raw classification code, valid or not.
    pub fn with_channel_kind_code(mut self, index: usize, code: i32) -> Self {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.kind_code = code;
        }
        self
    }

    pub fn with_ambient(mut self, ambient_c: f64) -> Self {
        self.ambient_c = ambient_c;
        self
    }
}

pub(crate) fn triad_index(triad: Triad) -> usize {
    match triad {
        Triad::Acceleration => 0,
        Triad::AngularRate => 1,
        Triad::MagneticField => 2,
    }
}
