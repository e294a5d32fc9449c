//! In-memory [`Transport`] over simulated boards.
//!
//! Handles are issued by [`MockTransport::plug`] in increasing order, and
//! enumeration lists plugged boards in that order. Sessions stay readable
//! after their board is unplugged: `is_attached` then reports `false` and
//! every other accessor fails with `HardwareError::Disconnected`.
//!
//! Lifecycle calls and hardware writes are recorded in a call log so that
//! tests can check ordering (for example that a session is closed only after
//! listeners saw the disconnect).

use super::device::{AttachBehavior, MockDevice, POTENTIAL_RANGE_MV, temperature_range, triad_index};
use crate::error::{HardwareError, Result};
use crate::transport::Transport;
use sensorium_core::{ChannelKind, Handle, OpenMode, Session, Triad, Vector3};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Native code for an argument outside the device's range.
pub const CODE_INVALID_ARGUMENT: i32 = 4;

/// Native code for an operation on a board that is gone.
pub const CODE_NOT_ATTACHED: i32 = 5;

/// Native code for an operation on a closed or unknown session.
pub const CODE_BAD_SESSION: i32 = 9;

/// Native code for injected faults.
pub const CODE_UNEXPECTED: i32 = 28;

const LIBRARY_VERSION: &str = "sensorium mock transport 1.0";

/// A hardware access that tests can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadPoint {
    /// Capability queries: axis counts and input counts.
    Capabilities,
    /// Data rate writes. The board still applies the rate, then reports
    /// the fault.
    DataRateWrite,
    /// Temperature range query of one thermocouple channel.
    ChannelRange(usize),
    /// One axis of a motion triad.
    Axis(Triad, usize),
    /// Temperature and potential of one thermocouple channel.
    Channel(usize),
    /// The ambient sensor of a thermal board.
    Ambient,
}

/// Recorded lifecycle call or hardware write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Enumerate,
    Open { handle: Handle, session: Session },
    WaitForAttach { session: Session },
    Close { session: Session },
    Delete { session: Session },
    SetDataRate { session: Session, rate_ms: u32 },
    ZeroGyro { session: Session },
    SetChannelKind { session: Session, index: usize, kind: ChannelKind },
}

#[derive(Debug)]
struct Bench {
    device: MockDevice,
    plugged: bool,
    faults: HashSet<ReadPoint>,
    unavailable_once: HashSet<ReadPoint>,
}

impl Bench {
    /// Fail a read at `point` when a fault or a one-shot gap is pending.
    fn sample(&mut self, session: Session, point: ReadPoint, call: &str) -> Result<()> {
        if self.faults.contains(&point) {
            return Err(HardwareError::fault(session, call, CODE_UNEXPECTED));
        }
        if self.unavailable_once.remove(&point) {
            return Err(HardwareError::unavailable(call));
        }
        Ok(())
    }

    fn axis_count(&self, triad: Triad) -> usize {
        self.device.axis_counts[triad_index(triad)]
    }

    fn check_axis(&self, session: Session, triad: Triad, axis: usize, call: &str) -> Result<()> {
        if axis >= self.axis_count(triad) {
            return Err(HardwareError::fault(session, call, CODE_INVALID_ARGUMENT));
        }
        Ok(())
    }

    fn channel(&self, session: Session, index: usize, call: &str) -> Result<&super::device::MockChannel> {
        self.device
            .channels
            .get(index)
            .ok_or_else(|| HardwareError::fault(session, call, CODE_INVALID_ARGUMENT))
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    handle: Handle,
    closed: bool,
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    next_session: u64,
    benches: BTreeMap<Handle, Bench>,
    sessions: BTreeMap<Session, SessionEntry>,
    enumeration_fails: bool,
    server_connected: bool,
    calls: Vec<TransportCall>,
}

impl MockState {
    fn bench(&mut self, handle: Handle, call: &str) -> Result<&mut Bench> {
        match self.benches.get_mut(&handle) {
            Some(bench) if bench.plugged => Ok(bench),
            _ => Err(HardwareError::fault(handle, call, CODE_NOT_ATTACHED)),
        }
    }

    fn session(&self, session: Session, call: &str) -> Result<SessionEntry> {
        match self.sessions.get(&session) {
            Some(entry) if !entry.closed => Ok(*entry),
            _ => Err(HardwareError::fault(session, call, CODE_BAD_SESSION)),
        }
    }

    /// Board behind an open session; fails once the board is unplugged.
    fn attached(&mut self, session: Session, call: &str) -> Result<&mut Bench> {
        let entry = self.session(session, call)?;
        match self.benches.get_mut(&entry.handle) {
            Some(bench) if bench.plugged => Ok(bench),
            _ => Err(HardwareError::disconnected(session.to_string())),
        }
    }
}

/// Transport over simulated boards.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sensorium_hardware::mock::{MockDevice, MockTransport};
/// use sensorium_hardware::{DeviceRegistry, RegistryConfig};
///
/// let transport = Arc::new(MockTransport::new());
/// let handle = transport.plug(MockDevice::thermal(77, 2));
///
/// let mut registry = DeviceRegistry::new(transport.clone(), RegistryConfig::default()).unwrap();
/// let report = registry.poll().unwrap();
///
/// assert_eq!(report.connected, vec![handle]);
/// assert_eq!(transport.open_sessions(), 1);
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an empty bench.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_handle: 1,
                next_session: 1,
                benches: BTreeMap::new(),
                sessions: BTreeMap::new(),
                enumeration_fails: false,
                server_connected: true,
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_bench(&self, handle: Handle, f: impl FnOnce(&mut Bench)) {
        if let Some(bench) = self.state().benches.get_mut(&handle) {
            f(bench);
        }
    }

    /// Attach a board and return the handle enumeration will report for it.
    pub fn plug(&self, device: MockDevice) -> Handle {
        let mut state = self.state();
        let handle = Handle::new(state.next_handle);
        state.next_handle += 1;
        state.benches.insert(
            handle,
            Bench {
                device,
                plugged: true,
                faults: HashSet::new(),
                unavailable_once: HashSet::new(),
            },
        );
        handle
    }

    /// Detach a board. Returns `false` when it was not plugged.
    pub fn unplug(&self, handle: Handle) -> bool {
        match self.state().benches.get_mut(&handle) {
            Some(bench) if bench.plugged => {
                bench.plugged = false;
                true
            }
            _ => false,
        }
    }

    /// Handles of plugged boards, in enumeration order.
    pub fn plugged(&self) -> Vec<Handle> {
        self.state()
            .benches
            .iter()
            .filter(|(_, bench)| bench.plugged)
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Handle a session was opened on.
    pub fn handle_of(&self, session: Session) -> Option<Handle> {
        self.state().sessions.get(&session).map(|entry| entry.handle)
    }

    pub fn set_attach(&self, handle: Handle, attach: AttachBehavior) {
        self.with_bench(handle, |bench| bench.device.attach = attach);
    }

    pub fn set_axes(&self, handle: Handle, triad: Triad, values: Vector3) {
        self.with_bench(handle, |bench| {
            bench.device.axis_values[triad_index(triad)] = values;
        });
    }

    pub fn set_channel(&self, handle: Handle, index: usize, temperature_c: f64, potential_mv: f64) {
        self.with_bench(handle, |bench| {
            if let Some(channel) = bench.device.channels.get_mut(index) {
                channel.temperature_c = temperature_c;
                channel.potential_mv = potential_mv;
            }
        });
    }

    pub fn set_ambient(&self, handle: Handle, ambient_c: f64) {
        self.with_bench(handle, |bench| bench.device.ambient_c = ambient_c);
    }

    /// Make every read at `point` fail with a fault until cleared.
    pub fn set_fault(&self, handle: Handle, point: ReadPoint) {
        self.with_bench(handle, |bench| {
            bench.faults.insert(point);
        });
    }

    pub fn clear_faults(&self, handle: Handle) {
        self.with_bench(handle, |bench| bench.faults.clear());
    }

    /// Make the next read at `point` report the sample as unavailable.
    pub fn make_unavailable_once(&self, handle: Handle, point: ReadPoint) {
        self.with_bench(handle, |bench| {
            bench.unavailable_once.insert(point);
        });
    }

    /// Make enumeration fail until called again with `false`.
    pub fn fail_enumeration(&self, fails: bool) {
        self.state().enumeration_fails = fails;
    }

    pub fn set_server_connected(&self, connected: bool) {
        self.state().server_connected = connected;
    }

    /// Sessions opened and not yet deleted.
    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Lifecycle calls and writes, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl Transport for MockTransport {
    fn attached_handles(&self) -> Result<Vec<Handle>> {
        let mut state = self.state();
        state.calls.push(TransportCall::Enumerate);
        if state.enumeration_fails {
            return Err(HardwareError::fault("manager", "attached_handles", CODE_UNEXPECTED));
        }
        Ok(state
            .benches
            .iter()
            .filter(|(_, bench)| bench.plugged)
            .map(|(handle, _)| *handle)
            .collect())
    }

    fn device_kind_code(&self, handle: Handle) -> Result<u32> {
        Ok(self.state().bench(handle, "device_kind_code")?.device.kind_code)
    }

    fn open(&self, handle: Handle, _mode: &OpenMode) -> Result<Session> {
        let mut state = self.state();
        if state.bench(handle, "open")?.device.attach == AttachBehavior::Claimed {
            return Err(HardwareError::contention(handle));
        }

        let session = Session::new(state.next_session);
        state.next_session += 1;
        state.sessions.insert(
            session,
            SessionEntry {
                handle,
                closed: false,
            },
        );
        state.calls.push(TransportCall::Open { handle, session });
        Ok(session)
    }

    fn wait_for_attach(&self, session: Session, timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::WaitForAttach { session });
        match state.attached(session, "wait_for_attach")?.device.attach {
            AttachBehavior::Stall => Err(HardwareError::timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
            _ => Ok(()),
        }
    }

    fn close(&self, session: Session) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::Close { session });
        match state.sessions.get_mut(&session) {
            Some(entry) if !entry.closed => {
                entry.closed = true;
                Ok(())
            }
            _ => Err(HardwareError::fault(session, "close", CODE_BAD_SESSION)),
        }
    }

    fn delete(&self, session: Session) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::Delete { session });
        state
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| HardwareError::fault(session, "delete", CODE_BAD_SESSION))
    }

    fn library_version(&self) -> Result<String> {
        Ok(LIBRARY_VERSION.to_string())
    }

    fn error_description(&self, code: i32) -> Result<String> {
        let description = match code {
            0 => "No error",
            CODE_INVALID_ARGUMENT => "Invalid argument",
            CODE_NOT_ATTACHED => "Device not attached",
            CODE_BAD_SESSION => "Invalid or closed session",
            CODE_UNEXPECTED => "Unexpected error",
            _ => "Unknown error code",
        };
        Ok(description.to_string())
    }

    fn server_connected(&self) -> Result<bool> {
        Ok(self.state().server_connected)
    }

    fn device_name(&self, session: Session) -> Result<String> {
        Ok(self.state().attached(session, "device_name")?.device.name.clone())
    }

    fn serial_number(&self, session: Session) -> Result<i32> {
        Ok(self.state().attached(session, "serial_number")?.device.serial_number)
    }

    fn device_version(&self, session: Session) -> Result<i32> {
        Ok(self.state().attached(session, "device_version")?.device.version)
    }

    fn device_type_name(&self, session: Session) -> Result<String> {
        Ok(self
            .state()
            .attached(session, "device_type_name")?
            .device
            .type_name
            .clone())
    }

    fn is_attached(&self, session: Session) -> Result<bool> {
        let state = self.state();
        let entry = state.session(session, "is_attached")?;
        Ok(state
            .benches
            .get(&entry.handle)
            .is_some_and(|bench| bench.plugged))
    }

    fn label(&self, session: Session) -> Result<String> {
        Ok(self.state().attached(session, "label")?.device.label.clone())
    }

    fn set_label(&self, session: Session, label: &str) -> Result<()> {
        self.state().attached(session, "set_label")?.device.label = label.to_string();
        Ok(())
    }

    fn axis_count(&self, session: Session, triad: Triad) -> Result<usize> {
        let mut state = self.state();
        let bench = state.attached(session, "axis_count")?;
        bench.sample(session, ReadPoint::Capabilities, "axis_count")?;
        Ok(bench.axis_count(triad))
    }

    fn axis_min(&self, session: Session, triad: Triad, axis: usize) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "axis_min")?;
        bench.check_axis(session, triad, axis, "axis_min")?;
        Ok(bench.device.axis_min[triad_index(triad)].axis(axis)?)
    }

    fn axis_max(&self, session: Session, triad: Triad, axis: usize) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "axis_max")?;
        bench.check_axis(session, triad, axis, "axis_max")?;
        Ok(bench.device.axis_max[triad_index(triad)].axis(axis)?)
    }

    fn read_axis(&self, session: Session, triad: Triad, axis: usize) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "read_axis")?;
        bench.check_axis(session, triad, axis, "read_axis")?;
        bench.sample(session, ReadPoint::Axis(triad, axis), "read_axis")?;
        Ok(bench.device.axis_values[triad_index(triad)].axis(axis)?)
    }

    fn data_rate(&self, session: Session) -> Result<u32> {
        Ok(self.state().attached(session, "data_rate")?.device.data_rate_ms)
    }

    fn set_data_rate(&self, session: Session, rate_ms: u32) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::SetDataRate { session, rate_ms });
        let bench = state.attached(session, "set_data_rate")?;
        let device = &mut bench.device;
        if !device.supported_data_rates.contains(&rate_ms) {
            // Refused rates still move the board to its nearest supported rate.
            if let Some(nearest) = device
                .supported_data_rates
                .iter()
                .copied()
                .min_by_key(|supported| supported.abs_diff(rate_ms))
            {
                device.data_rate_ms = nearest;
            }
            return Err(HardwareError::rejected(
                "data_rate",
                format!("{rate_ms}ms is not supported"),
            ));
        }
        device.data_rate_ms = rate_ms;
        bench.sample(session, ReadPoint::DataRateWrite, "set_data_rate")
    }

    fn zero_gyro(&self, session: Session) -> Result<()> {
        let mut state = self.state();
        state.calls.push(TransportCall::ZeroGyro { session });
        state.attached(session, "zero_gyro").map(|_| ())
    }

    fn input_count(&self, session: Session) -> Result<usize> {
        let mut state = self.state();
        let bench = state.attached(session, "input_count")?;
        bench.sample(session, ReadPoint::Capabilities, "input_count")?;
        Ok(bench.device.channels.len())
    }

    fn channel_kind(&self, session: Session, index: usize) -> Result<ChannelKind> {
        let mut state = self.state();
        let bench = state.attached(session, "channel_kind")?;
        let code = bench.channel(session, index, "channel_kind")?.kind_code;
        Ok(ChannelKind::from_code(code)?)
    }

    fn set_channel_kind(&self, session: Session, index: usize, kind: ChannelKind) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(TransportCall::SetChannelKind { session, index, kind });
        let bench = state.attached(session, "set_channel_kind")?;
        match bench.device.channels.get_mut(index) {
            Some(channel) => {
                channel.kind_code = kind.code();
                Ok(())
            }
            None => Err(HardwareError::fault(
                session,
                "set_channel_kind",
                CODE_INVALID_ARGUMENT,
            )),
        }
    }

    fn temperature_range(&self, session: Session, index: usize) -> Result<(f64, f64)> {
        let mut state = self.state();
        let bench = state.attached(session, "temperature_range")?;
        bench.sample(session, ReadPoint::ChannelRange(index), "temperature_range")?;
        let code = bench.channel(session, index, "temperature_range")?.kind_code;
        Ok(temperature_range(ChannelKind::from_code(code)?))
    }

    fn potential_range(&self, session: Session, index: usize) -> Result<(f64, f64)> {
        let mut state = self.state();
        let bench = state.attached(session, "potential_range")?;
        bench.channel(session, index, "potential_range")?;
        Ok(POTENTIAL_RANGE_MV)
    }

    fn temperature(&self, session: Session, index: usize) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "temperature")?;
        bench.sample(session, ReadPoint::Channel(index), "temperature")?;
        Ok(bench.channel(session, index, "temperature")?.temperature_c)
    }

    fn potential(&self, session: Session, index: usize) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "potential")?;
        bench.sample(session, ReadPoint::Channel(index), "potential")?;
        Ok(bench.channel(session, index, "potential")?.potential_mv)
    }

    fn ambient_temperature(&self, session: Session) -> Result<f64> {
        let mut state = self.state();
        let bench = state.attached(session, "ambient_temperature")?;
        bench.sample(session, ReadPoint::Ambient, "ambient_temperature")?;
        Ok(bench.device.ambient_c)
    }

    fn ambient_range(&self, session: Session) -> Result<(f64, f64)> {
        Ok(self.state().attached(session, "ambient_range")?.device.ambient_range)
    }
}
