//! Thermocouple boards.
//!
//! A thermal board has a fixed number of thermocouple channels plus an
//! ambient (board) temperature sensor. Each channel carries its own
//! classification and a temperature range that depends on it.

use crate::devices::DeviceCore;
use crate::error::{HardwareError, Result};
use crate::transport::Transport;
use sensorium_core::{ChannelKind, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Temperature in Celsius and raw potential in millivolts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelMeasure {
    pub temperature_c: f64,
    pub potential_mv: f64,
}

impl ChannelMeasure {
    pub const fn new(temperature_c: f64, potential_mv: f64) -> Self {
        Self {
            temperature_c,
            potential_mv,
        }
    }
}

impl fmt::Display for ChannelMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}C {:.3}mV", self.temperature_c, self.potential_mv)
    }
}

/// One thermocouple input.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    index: usize,
    kind: ChannelKind,
    measure: ChannelMeasure,
    min_measure: ChannelMeasure,
    max_measure: ChannelMeasure,
}

impl Channel {
    fn query(transport: &dyn Transport, session: Session, index: usize) -> Result<Self> {
        let (kind, min_measure, max_measure) = Self::query_config(transport, session, index)?;
        Ok(Self {
            index,
            kind,
            measure: ChannelMeasure::default(),
            min_measure,
            max_measure,
        })
    }

    /// Classification and the bounds that go with it.
    fn query_config(
        transport: &dyn Transport,
        session: Session,
        index: usize,
    ) -> Result<(ChannelKind, ChannelMeasure, ChannelMeasure)> {
        let kind = transport.channel_kind(session, index)?;
        let (min_c, max_c) = transport.temperature_range(session, index)?;
        let (min_mv, max_mv) = transport.potential_range(session, index)?;
        Ok((
            kind,
            ChannelMeasure::new(min_c, min_mv),
            ChannelMeasure::new(max_c, max_mv),
        ))
    }

    fn read(&self, transport: &dyn Transport, session: Session) -> Result<ChannelMeasure> {
        Ok(ChannelMeasure::new(
            transport.temperature(session, self.index)?,
            transport.potential(session, self.index)?,
        ))
    }

    /// Store a fresh measure, returning whether it differs from the cache.
    fn store(&mut self, measure: ChannelMeasure) -> bool {
        if measure == self.measure {
            return false;
        }
        self.measure = measure;
        true
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn measure(&self) -> &ChannelMeasure {
        &self.measure
    }

    pub fn min_measure(&self) -> &ChannelMeasure {
        &self.min_measure
    }

    pub fn max_measure(&self) -> &ChannelMeasure {
        &self.max_measure
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}: {} min:{} max:{}",
            self.index, self.kind, self.measure, self.min_measure, self.max_measure
        )
    }
}

/// Thermocouple board owned by the registry.
#[derive(Debug)]
pub struct ThermalSensor {
    core: DeviceCore,
    channels: Vec<Channel>,
    ambient_c: f64,
    ambient_min_c: f64,
    ambient_max_c: f64,
}

impl ThermalSensor {
    pub(crate) fn new(core: DeviceCore) -> Result<Self> {
        let transport = core.transport();
        let session = core.session();

        let count = transport.input_count(session)?;
        let channels = (0..count)
            .map(|index| Channel::query(transport, session, index))
            .collect::<Result<Vec<_>>>()?;
        let (ambient_min_c, ambient_max_c) = transport.ambient_range(session)?;

        debug!(
            %session,
            serial = core.info().serial_number,
            channels = channels.len(),
            "thermal device constructed"
        );

        Ok(Self {
            core,
            channels,
            ambient_c: 0.0,
            ambient_min_c,
            ambient_max_c,
        })
    }

    pub(crate) fn core(&self) -> &DeviceCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn ambient_c(&self) -> f64 {
        self.ambient_c
    }

    pub fn ambient_min_c(&self) -> f64 {
        self.ambient_min_c
    }

    pub fn ambient_max_c(&self) -> f64 {
        self.ambient_max_c
    }

    /// Reclassify a channel and reload its bounds.
    ///
    /// This is a configuration change, not a measure change: no listener is
    /// notified.
    ///
    /// # Errors
    /// `NotFound` for an index past the last channel, or the transport
    /// error of the write or the read-back. A failed read-back leaves the
    /// cached kind and bounds as they were.
    pub fn set_channel_kind(&mut self, index: usize, kind: ChannelKind) -> Result<()> {
        let transport = self.core.transport();
        let session = self.core.session();
        let channel = self
            .channels
            .get_mut(index)
            .ok_or_else(|| HardwareError::not_found(format!("channel {index}")))?;

        transport.set_channel_kind(session, index, kind)?;
        // Kind and bounds are committed together or not at all.
        let (kind, min_measure, max_measure) = Channel::query_config(transport, session, index)?;
        channel.kind = kind;
        channel.min_measure = min_measure;
        channel.max_measure = max_measure;

        debug!(%session, index, kind = %channel.kind, "channel reclassified");
        Ok(())
    }

    /// Every channel and the ambient sensor are read before anything is
    /// stored, so a failing read leaves the whole cache untouched.
    pub(crate) fn refresh(&mut self) -> Result<bool> {
        let transport = self.core.transport();
        let session = self.core.session();

        let fresh = self
            .channels
            .iter()
            .map(|channel| channel.read(transport, session))
            .collect::<Result<Vec<_>>>()?;
        let ambient_c = transport.ambient_temperature(session)?;

        let mut changed = false;
        for (channel, measure) in self.channels.iter_mut().zip(fresh) {
            changed |= channel.store(measure);
        }
        if ambient_c != self.ambient_c {
            self.ambient_c = ambient_c;
            changed = true;
        }

        Ok(changed)
    }
}

impl fmt::Display for ThermalSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ambient:{:.3}C min:{:.3}C max:{:.3}C channels:[",
            self.ambient_c, self.ambient_min_c, self.ambient_max_c
        )?;
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{channel}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;
    use crate::devices::{self, Device};
    use crate::mock::{MockDevice, MockTransport, ReadPoint, TransportCall};
    use rstest::rstest;
    use sensorium_core::constants::KIND_CODE_THERMAL;
    use sensorium_core::{Handle, OpenMode};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn thermal(transport: &Arc<MockTransport>, device: MockDevice) -> (Handle, Device) {
        let handle = transport.plug(device);
        let session = transport.open(handle, &OpenMode::Local).unwrap();
        let entry = devices::lookup_kind(KIND_CODE_THERMAL).unwrap();
        let device =
            devices::construct(entry, session, transport.clone(), &CalibrationTable::new()).unwrap();
        (handle, device)
    }

    fn sensor(device: &Device) -> &ThermalSensor {
        device.as_thermal().unwrap()
    }

    #[test]
    fn test_construction_reads_channels() {
        let transport = Arc::new(MockTransport::new());
        let (_, device) = thermal(&transport, MockDevice::thermal(3, 4));
        let sensor = sensor(&device);

        assert_eq!(sensor.channels().len(), 4);
        for (i, channel) in sensor.channels().iter().enumerate() {
            assert_eq!(channel.index(), i);
            assert_eq!(channel.kind(), ChannelKind::K);
            assert_eq!(channel.max_measure().temperature_c, 1372.0);
        }
        assert!(sensor.channel(4).is_none());
        assert!(sensor.ambient_min_c() < sensor.ambient_max_c());
    }

    #[test]
    fn test_zero_channels_is_valid() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 0));

        assert!(sensor(&device).channels().is_empty());
        transport.set_ambient(handle, 21.5);
        assert!(device.update().unwrap());
        assert_eq!(sensor(&device).ambient_c(), 21.5);
    }

    #[test]
    fn test_single_notification_for_many_changes() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 2));

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        device.add_listener(Arc::new(move |_: &mut Device| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        transport.set_channel(handle, 0, 100.0, 4.1);
        transport.set_channel(handle, 1, 200.0, 8.1);
        transport.set_ambient(handle, 24.0);

        assert!(device.update().unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let sensor = sensor(&device);
        assert_eq!(*sensor.channels()[0].measure(), ChannelMeasure::new(100.0, 4.1));
        assert_eq!(*sensor.channels()[1].measure(), ChannelMeasure::new(200.0, 8.1));
    }

    #[test]
    fn test_one_changed_channel_leaves_the_others_untouched() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 2));
        transport.set_channel(handle, 0, 20.0, 0.8);
        transport.set_channel(handle, 1, 30.125, 1.2);
        transport.set_ambient(handle, 22.0);
        device.update().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        device.add_listener(Arc::new(move |_: &mut Device| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let before = *sensor(&device).channels()[1].measure();

        transport.set_channel(handle, 0, 21.5, 0.86);
        assert!(device.update().unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let sensor = sensor(&device);
        assert_eq!(*sensor.channels()[0].measure(), ChannelMeasure::new(21.5, 0.86));
        let after = sensor.channels()[1].measure();
        assert_eq!(after.temperature_c.to_bits(), before.temperature_c.to_bits());
        assert_eq!(after.potential_mv.to_bits(), before.potential_mv.to_bits());
        assert_eq!(sensor.ambient_c(), 22.0);
    }

    #[test]
    fn test_unchanged_values_report_no_change() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 2));

        transport.set_channel(handle, 1, 50.0, 2.0);
        assert!(device.update().unwrap());
        assert!(!device.update().unwrap());
    }

    #[rstest]
    #[case(ReadPoint::Channel(1))]
    #[case(ReadPoint::Ambient)]
    fn test_failed_read_keeps_every_cache(#[case] point: ReadPoint) {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 2));

        transport.set_channel(handle, 0, 80.0, 3.0);
        transport.set_fault(handle, point);

        assert!(device.update().is_err());
        assert_eq!(*sensor(&device).channels()[0].measure(), ChannelMeasure::default());
    }

    #[test]
    fn test_set_channel_kind_reloads_bounds_without_notifying() {
        let transport = Arc::new(MockTransport::new());
        let (_, mut device) = thermal(&transport, MockDevice::thermal(3, 2));
        let session = device.session();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        device.add_listener(Arc::new(move |_: &mut Device| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        device
            .as_thermal_mut()
            .unwrap()
            .set_channel_kind(1, ChannelKind::T)
            .unwrap();

        let channel = sensor(&device).channel(1).unwrap();
        assert_eq!(channel.kind(), ChannelKind::T);
        assert_eq!(channel.max_measure().temperature_c, 400.0);
        assert_eq!(sensor(&device).channel(0).unwrap().kind(), ChannelKind::K);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(transport.calls().contains(&TransportCall::SetChannelKind {
            session,
            index: 1,
            kind: ChannelKind::T,
        }));
    }

    #[test]
    fn test_failed_range_query_keeps_kind_and_bounds_together() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 2));
        transport.set_fault(handle, ReadPoint::ChannelRange(0));

        let result = device
            .as_thermal_mut()
            .unwrap()
            .set_channel_kind(0, ChannelKind::T);
        assert!(matches!(result, Err(HardwareError::Fault { .. })));

        let channel = sensor(&device).channel(0).unwrap();
        assert_eq!(channel.kind(), ChannelKind::K);
        assert_eq!(channel.max_measure().temperature_c, 1372.0);

        transport.clear_faults(handle);
        device
            .as_thermal_mut()
            .unwrap()
            .set_channel_kind(0, ChannelKind::T)
            .unwrap();
        let channel = sensor(&device).channel(0).unwrap();
        assert_eq!(channel.kind(), ChannelKind::T);
        assert_eq!(channel.max_measure().temperature_c, 400.0);
    }

    #[test]
    fn test_set_channel_kind_bad_index() {
        let transport = Arc::new(MockTransport::new());
        let (_, mut device) = thermal(&transport, MockDevice::thermal(3, 2));

        let result = device
            .as_thermal_mut()
            .unwrap()
            .set_channel_kind(2, ChannelKind::J);
        assert!(matches!(result, Err(HardwareError::NotFound { .. })));
    }

    #[test]
    fn test_display() {
        let transport = Arc::new(MockTransport::new());
        let (handle, mut device) = thermal(&transport, MockDevice::thermal(3, 1));
        transport.set_channel(handle, 0, 25.0, 1.0);
        transport.set_ambient(handle, 22.0);
        device.update().unwrap();

        let text = sensor(&device).to_string();
        assert!(text.starts_with("ambient:22.000C"));
        assert!(text.contains("#0 K-type: 25.000C 1.000mV"));
    }
}
