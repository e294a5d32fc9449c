use crate::{
    Result,
    constants::{KIND_CODE_MOTION, KIND_CODE_THERMAL, MAX_AXES},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity token issued by the transport enumeration.
///
/// Unique per physically attached device at any instant. The registry uses
/// it as the only key when reconciling its records against the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Handle(raw)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Token for one opened device, returned by the transport's `open`.
///
/// Every per-device read and write addresses a session. A device owns its
/// session until the registry closes and deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(u64);

impl Session {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Session(raw)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Device kinds the registry knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Accelerometer, gyroscope and compass board.
    Motion,
    /// Thermocouple interface board with an ambient sensor.
    Thermal,
}

impl DeviceKind {
    /// Resolve a vendor kind code.
    ///
    /// # Errors
    /// Returns `Error::UnknownKindCode` for codes without a device kind.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            KIND_CODE_MOTION => Ok(DeviceKind::Motion),
            KIND_CODE_THERMAL => Ok(DeviceKind::Thermal),
            other => Err(Error::UnknownKindCode(other)),
        }
    }

    /// Vendor kind code for this kind.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            DeviceKind::Motion => KIND_CODE_MOTION,
            DeviceKind::Thermal => KIND_CODE_THERMAL,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceKind::Motion => write!(f, "Motion"),
            DeviceKind::Thermal => write!(f, "Thermal"),
        }
    }
}

/// How the transport reaches a device when opening it.
///
/// The registry forwards this value untouched; only the transport acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OpenMode {
    /// Device attached to this machine.
    #[default]
    Local,
    /// Device served by a remote server located by its identifier.
    RemoteById { server_id: String, password: String },
    /// Device served by a remote server at a fixed address.
    RemoteByAddress {
        address: String,
        port: u16,
        password: String,
    },
}

impl OpenMode {
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, OpenMode::Local)
    }
}

/// The three measurement triads of a motion board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Triad {
    /// Linear acceleration in g.
    Acceleration,
    /// Angular rate in degrees per second.
    AngularRate,
    /// Magnetic field in gauss.
    MagneticField,
}

impl Triad {
    pub const ALL: [Triad; 3] = [Triad::Acceleration, Triad::AngularRate, Triad::MagneticField];
}

impl fmt::Display for Triad {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Triad::Acceleration => write!(f, "acceleration"),
            Triad::AngularRate => write!(f, "angular_rate"),
            Triad::MagneticField => write!(f, "magnetic_field"),
        }
    }
}

/// Three-component reading. Equality is exact, component by component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    #[must_use]
    pub fn from_array(values: [f64; MAX_AXES]) -> Self {
        Vector3::new(values[0], values[1], values[2])
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; MAX_AXES] {
        [self.x, self.y, self.z]
    }

    /// Component for an axis index (0 = x, 1 = y, 2 = z).
    ///
    /// # Errors
    /// Returns `Error::AxisOutOfRange` for indices past the z axis.
    pub fn axis(&self, index: usize) -> Result<f64> {
        self.to_array()
            .get(index)
            .copied()
            .ok_or(Error::AxisOutOfRange {
                index,
                max: MAX_AXES - 1,
            })
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3} {:.3} {:.3}", self.x, self.y, self.z)
    }
}

/// Thermocouple classification of a thermal channel.
///
/// The wire codes (1-4) are the ones the hardware reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    K,
    J,
    E,
    T,
}

impl ChannelKind {
    /// Parse a hardware classification code.
    ///
    /// # Errors
    /// Returns `Error::InvalidChannelKind` for codes outside 1-4.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(ChannelKind::K),
            2 => Ok(ChannelKind::J),
            3 => Ok(ChannelKind::E),
            4 => Ok(ChannelKind::T),
            other => Err(Error::InvalidChannelKind(other)),
        }
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            ChannelKind::K => 1,
            ChannelKind::J => 2,
            ChannelKind::E => 3,
            ChannelKind::T => 4,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChannelKind::K => "K",
            ChannelKind::J => "J",
            ChannelKind::E => "E",
            ChannelKind::T => "T",
        };
        write!(f, "{name}-type")
    }
}
