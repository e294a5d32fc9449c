//! Polled devices and kind dispatch.
//!
//! Every device the registry owns is a [`Device`], a closed enum over the
//! supported kinds. The kind-specific types ([`MotionSensor`],
//! [`ThermalSensor`]) embed a [`DeviceCore`] that holds what all kinds share:
//! the session, the cached identity, the transport and the listener list.
//!
//! # Construction
//!
//! Devices can only be built inside the crate. The registry resolves the
//! vendor kind code through a fixed table of constructors; codes missing from
//! the table have no device type and are skipped.
//!
//! # Polling
//!
//! [`Device::update`] reads a fresh measure, compares it by value with the
//! cached one and, when it differs, stores it and fires exactly one
//! `on_device_changed` to the device's listeners over a snapshot.

use crate::calibration::CalibrationTable;
use crate::error::Result;
use crate::listener::{DeviceListener, ListenerList};
use crate::motion::MotionSensor;
use crate::thermal::ThermalSensor;
use crate::transport::{SharedTransport, Transport};
use crate::types::DeviceInfo;
use chrono::{DateTime, Utc};
use sensorium_core::{DeviceKind, Session};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// State shared by all device kinds.
pub struct DeviceCore {
    kind: DeviceKind,
    session: Session,
    info: DeviceInfo,
    transport: SharedTransport,
    listeners: ListenerList<dyn DeviceListener>,
    connected_at: DateTime<Utc>,
}

impl DeviceCore {
    /// Query the static identity of an attached session.
    pub(crate) fn query(kind: DeviceKind, session: Session, transport: SharedTransport) -> Result<Self> {
        let info = DeviceInfo {
            name: transport.device_name(session)?,
            serial_number: transport.serial_number(session)?,
            version: transport.device_version(session)?,
            type_name: transport.device_type_name(session)?,
        };

        Ok(Self {
            kind,
            session,
            info,
            transport,
            listeners: ListenerList::new(),
            connected_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("kind", &self.kind)
            .field("session", &self.session)
            .field("info", &self.info)
            .field("listeners", &self.listeners)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// A device owned by the registry.
#[derive(Debug)]
#[non_exhaustive]
pub enum Device {
    /// Accelerometer, gyroscope and compass board.
    Motion(MotionSensor),

    /// Thermocouple board with an ambient sensor.
    Thermal(ThermalSensor),
}

impl Device {
    fn core(&self) -> &DeviceCore {
        match self {
            Self::Motion(device) => device.core(),
            Self::Thermal(device) => device.core(),
        }
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        match self {
            Self::Motion(device) => device.core_mut(),
            Self::Thermal(device) => device.core_mut(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.core().kind
    }

    /// Cached identity, readable even after the hardware is gone.
    pub fn info(&self) -> &DeviceInfo {
        &self.core().info
    }

    pub fn session(&self) -> Session {
        self.core().session
    }

    /// When the registry constructed this device.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.core().connected_at
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.core().connected_at
    }

    /// Live attachment status, queried from the hardware on every call.
    pub fn is_attached(&self) -> Result<bool> {
        let core = self.core();
        core.transport().is_attached(core.session)
    }

    /// Live user label, queried from the hardware on every call.
    pub fn label(&self) -> Result<String> {
        let core = self.core();
        core.transport().label(core.session)
    }

    pub fn set_label(&mut self, label: &str) -> Result<()> {
        let core = self.core();
        core.transport().set_label(core.session, label)
    }

    pub fn add_listener(&mut self, listener: Arc<dyn DeviceListener>) {
        self.core_mut().listeners.add(listener);
    }

    /// Returns `false` when the listener was not registered.
    pub fn remove_listener(&mut self, listener: &Arc<dyn DeviceListener>) -> bool {
        self.core_mut().listeners.remove(listener)
    }

    pub fn remove_listeners(&mut self) {
        self.core_mut().listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.core().listeners.len()
    }

    /// Poll the hardware once.
    ///
    /// Returns whether the measure changed. A change fires one notification
    /// to this device's listeners before returning.
    ///
    /// # Errors
    ///
    /// Returns the transport error when a read the device cannot absorb
    /// fails. The cached measure is left untouched in that case.
    pub fn update(&mut self) -> Result<bool> {
        let changed = match self {
            Self::Motion(device) => device.refresh()?,
            Self::Thermal(device) => device.refresh()?,
        };

        if changed {
            trace!(session = %self.session(), "measure changed");
            let listeners = self.core().listeners.snapshot();
            for listener in &listeners {
                listener.on_device_changed(self);
            }
        }

        Ok(changed)
    }

    pub fn as_motion(&self) -> Option<&MotionSensor> {
        match self {
            Self::Motion(device) => Some(device),
            _ => None,
        }
    }

    pub fn as_motion_mut(&mut self) -> Option<&mut MotionSensor> {
        match self {
            Self::Motion(device) => Some(device),
            _ => None,
        }
    }

    pub fn as_thermal(&self) -> Option<&ThermalSensor> {
        match self {
            Self::Thermal(device) => Some(device),
            _ => None,
        }
    }

    pub fn as_thermal_mut(&mut self) -> Option<&mut ThermalSensor> {
        match self {
            Self::Thermal(device) => Some(device),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        write!(
            f,
            "kind:{} name:'{}' serial:{} version:{} type:'{}'",
            self.kind(),
            info.name,
            info.serial_number,
            info.version,
            info.type_name
        )?;

        match self.is_attached() {
            Ok(attached) => write!(f, " attached:{attached}")?,
            Err(_) => write!(f, " attached:?")?,
        }
        match self.label() {
            Ok(label) => write!(f, " label:'{label}'")?,
            Err(_) => write!(f, " label:?")?,
        }

        match self {
            Self::Motion(device) => write!(f, " {device}"),
            Self::Thermal(device) => write!(f, " {device}"),
        }
    }
}

type Constructor = fn(DeviceCore, &CalibrationTable) -> Result<Device>;

/// One row of the kind dispatch table.
pub(crate) struct KindEntry {
    pub(crate) kind: DeviceKind,
    construct: Constructor,
}

const KIND_TABLE: &[KindEntry] = &[
    KindEntry {
        kind: DeviceKind::Motion,
        construct: construct_motion,
    },
    KindEntry {
        kind: DeviceKind::Thermal,
        construct: construct_thermal,
    },
];

/// Constructor for a vendor kind code, `None` when the kind is unsupported.
pub(crate) fn lookup_kind(code: u32) -> Option<&'static KindEntry> {
    let kind = DeviceKind::from_code(code).ok()?;
    KIND_TABLE.iter().find(|entry| entry.kind == kind)
}

/// Build the device for an attached session.
pub(crate) fn construct(
    entry: &KindEntry,
    session: Session,
    transport: SharedTransport,
    calibration: &CalibrationTable,
) -> Result<Device> {
    let core = DeviceCore::query(entry.kind, session, transport)?;
    (entry.construct)(core, calibration)
}

fn construct_motion(core: DeviceCore, calibration: &CalibrationTable) -> Result<Device> {
    let calibration = calibration.lookup(core.info.serial_number);
    MotionSensor::new(core, calibration).map(Device::Motion)
}

fn construct_thermal(core: DeviceCore, _calibration: &CalibrationTable) -> Result<Device> {
    ThermalSensor::new(core).map(Device::Thermal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockTransport};
    use sensorium_core::{OpenMode, Triad, Vector3};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn open_device(transport: &Arc<MockTransport>, device: MockDevice) -> Device {
        let handle = transport.plug(device);
        let code = transport.device_kind_code(handle).unwrap();
        let session = transport.open(handle, &OpenMode::Local).unwrap();
        transport
            .wait_for_attach(session, Duration::from_millis(10))
            .unwrap();
        let entry = lookup_kind(code).unwrap();
        construct(entry, session, transport.clone(), &CalibrationTable::new()).unwrap()
    }

    #[test]
    fn test_kind_table_lookup() {
        for kind in [DeviceKind::Motion, DeviceKind::Thermal] {
            assert_eq!(lookup_kind(kind.code()).unwrap().kind, kind);
        }
        assert!(lookup_kind(0x7d).is_none());
    }

    #[test]
    fn test_identity_is_cached() {
        let transport = Arc::new(MockTransport::new());
        let device = open_device(&transport, MockDevice::motion(4242).with_name("Bench IMU"));

        assert_eq!(device.kind(), DeviceKind::Motion);
        assert_eq!(device.info().name, "Bench IMU");
        assert_eq!(device.info().serial_number, 4242);
        assert!(device.as_motion().is_some());
        assert!(device.as_thermal().is_none());
    }

    #[test]
    fn test_live_fields_follow_hardware() {
        let transport = Arc::new(MockTransport::new());
        let mut device = open_device(&transport, MockDevice::thermal(77, 1));

        assert!(device.is_attached().unwrap());
        device.set_label("furnace").unwrap();
        assert_eq!(device.label().unwrap(), "furnace");

        let handle = transport.handle_of(device.session()).unwrap();
        transport.unplug(handle);
        assert!(!device.is_attached().unwrap());
        assert_eq!(device.info().serial_number, 77);
    }

    #[test]
    fn test_update_notifies_once_per_change() {
        let transport = Arc::new(MockTransport::new());
        let mut device = open_device(&transport, MockDevice::motion(1).with_axes(3, 3, 3));
        let handle = transport.handle_of(device.session()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        device.add_listener(Arc::new(move |_: &mut Device| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        transport.set_axes(handle, Triad::Acceleration, Vector3::new(0.0, 0.0, 1.0));
        assert!(device.update().unwrap());
        assert!(!device.update().unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_remove_itself_during_notification() {
        let transport = Arc::new(MockTransport::new());
        let mut device = open_device(&transport, MockDevice::motion(1).with_axes(3, 0, 0));
        let handle = transport.handle_of(device.session()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<std::sync::Mutex<Option<Arc<dyn DeviceListener>>>> =
            Arc::new(std::sync::Mutex::new(None));

        let counter = hits.clone();
        let own = slot.clone();
        let listener: Arc<dyn DeviceListener> = Arc::new(move |device: &mut Device| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = own.lock().unwrap().take() {
                assert!(device.remove_listener(&me));
            }
        });
        *slot.lock().unwrap() = Some(listener.clone());

        let bystander_hits = Arc::new(AtomicUsize::new(0));
        let bystander_counter = bystander_hits.clone();
        device.add_listener(listener);
        device.add_listener(Arc::new(move |_: &mut Device| {
            bystander_counter.fetch_add(1, Ordering::SeqCst);
        }));

        transport.set_axes(handle, Triad::Acceleration, Vector3::new(1.0, 0.0, 0.0));
        device.update().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bystander_hits.load(Ordering::SeqCst), 1);
        assert_eq!(device.listener_count(), 1);

        transport.set_axes(handle, Triad::Acceleration, Vector3::new(2.0, 0.0, 0.0));
        device.update().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bystander_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_listeners() {
        let transport = Arc::new(MockTransport::new());
        let mut device = open_device(&transport, MockDevice::thermal(5, 2));
        let listener: Arc<dyn DeviceListener> = Arc::new(|_: &mut Device| {});

        device.add_listener(listener.clone());
        device.add_listener(Arc::new(|_: &mut Device| {}));
        device.remove_listeners();

        assert_eq!(device.listener_count(), 0);
        assert!(!device.remove_listener(&listener));
    }

    #[test]
    fn test_display_includes_identity() {
        let transport = Arc::new(MockTransport::new());
        let device = open_device(
            &transport,
            MockDevice::thermal(31, 1).with_name("Kiln monitor").with_label("kiln"),
        );

        let text = device.to_string();
        assert!(text.starts_with("kind:Thermal name:'Kiln monitor' serial:31"));
        assert!(text.contains("attached:true"));
        assert!(text.contains("label:'kiln'"));
    }
}
