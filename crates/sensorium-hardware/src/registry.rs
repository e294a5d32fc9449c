//! Device registry and reconciliation.
//!
//! The registry keeps one record per attached device it knows how to drive,
//! keyed by the enumeration [`Handle`]. Each call to [`DeviceRegistry::poll`]
//! runs one cycle:
//!
//! 1. Enumerate the attached handles. A failure here aborts the cycle with
//!    no state change.
//! 2. Diff the enumeration against the records: handles to remove (in
//!    registry order) and handles to add (in enumeration order).
//! 3. For each removal: notify `on_device_disconnecting` while the device is
//!    still reachable, erase the record, then close and delete the session.
//! 4. For each addition: open the handle, wait for attachment within the
//!    configured bound, construct the device for its kind, insert it and
//!    notify `on_device_connected`. A failed addition releases whatever was
//!    opened, is reported, and does not stop the cycle.
//! 5. Update every device in registry order.
//!
//! Handles whose kind has no constructor are remembered and not reopened
//! until they leave the enumeration.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use sensorium_core::{Triad, Vector3};
//! use sensorium_hardware::mock::{MockDevice, MockTransport};
//! use sensorium_hardware::{DeviceRegistry, RegistryConfig};
//!
//! let transport = Arc::new(MockTransport::new());
//! let handle = transport.plug(MockDevice::motion(42));
//! let mut registry = DeviceRegistry::new(transport.clone(), RegistryConfig::default()).unwrap();
//!
//! registry.poll().unwrap();
//! transport.set_axes(handle, Triad::Acceleration, Vector3::new(0.0, 0.0, 1.0));
//! let report = registry.poll().unwrap();
//!
//! assert_eq!(report.changed, vec![handle]);
//! let motion = registry.device(handle).and_then(|d| d.as_motion()).unwrap();
//! assert_eq!(motion.measure().acceleration.z, 1.0);
//! ```

use crate::config::RegistryConfig;
use crate::devices::{self, Device};
use crate::error::{HardwareError, Result};
use crate::listener::{ListenerList, RegistryListener};
use crate::transport::SharedTransport;
use crate::types::PollReport;
use sensorium_core::{Handle, Session};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct DeviceRecord {
    handle: Handle,
    device: Device,
}

enum AddOutcome {
    Connected,
    Ignored,
}

/// Owner of every device the transport currently reports.
pub struct DeviceRegistry {
    transport: SharedTransport,
    config: RegistryConfig,
    records: Vec<DeviceRecord>,
    ignored: HashSet<Handle>,
    listeners: ListenerList<dyn RegistryListener>,
    polling: bool,
}

impl DeviceRegistry {
    /// Create an empty registry. Nothing is enumerated until the first poll.
    ///
    /// # Errors
    /// Returns `Error::Config` when the configuration is invalid.
    pub fn new(transport: SharedTransport, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            records: Vec::new(),
            ignored: HashSet::new(),
            listeners: ListenerList::new(),
            polling: false,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether devices are opened on this machine rather than over a server.
    pub fn is_local(&self) -> bool {
        self.config.open_mode.is_local()
    }

    pub fn library_version(&self) -> Result<String> {
        self.transport.library_version()
    }

    pub fn error_description(&self, code: i32) -> Result<String> {
        self.transport.error_description(code)
    }

    /// Server reachability. Always `true` for local registries.
    pub fn is_server_connected(&self) -> Result<bool> {
        if self.is_local() {
            return Ok(true);
        }
        self.transport.server_connected()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn RegistryListener>) {
        self.listeners.add(listener);
    }

    /// Returns `false` when the listener was not registered.
    pub fn remove_listener(&mut self, listener: &Arc<dyn RegistryListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.position(handle).is_some()
    }

    /// Handles in registry order.
    pub fn handles(&self) -> Vec<Handle> {
        self.records.iter().map(|record| record.handle).collect()
    }

    pub fn device(&self, handle: Handle) -> Option<&Device> {
        self.records
            .iter()
            .find(|record| record.handle == handle)
            .map(|record| &record.device)
    }

    pub fn device_mut(&mut self, handle: Handle) -> Option<&mut Device> {
        self.records
            .iter_mut()
            .find(|record| record.handle == handle)
            .map(|record| &mut record.device)
    }

    /// Devices in registry order, paired with their handles.
    pub fn devices(&self) -> impl Iterator<Item = (Handle, &Device)> {
        self.records
            .iter()
            .map(|record| (record.handle, &record.device))
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = (Handle, &mut Device)> {
        self.records
            .iter_mut()
            .map(|record| (record.handle, &mut record.device))
    }

    fn position(&self, handle: Handle) -> Option<usize> {
        self.records.iter().position(|record| record.handle == handle)
    }

    /// Run one reconciliation and update cycle.
    ///
    /// # Errors
    ///
    /// * `PollInProgress` when called from inside a notification of the
    ///   cycle already running.
    /// * The enumeration error, when the transport cannot list handles. The
    ///   registry is left exactly as it was.
    ///
    /// Failures of single devices do not fail the cycle; they are listed in
    /// the returned report.
    pub fn poll(&mut self) -> Result<PollReport> {
        if self.polling {
            return Err(HardwareError::PollInProgress);
        }

        self.polling = true;
        let result = self.run_cycle();
        self.polling = false;
        result
    }

    fn run_cycle(&mut self) -> Result<PollReport> {
        let attached = match self.transport.attached_handles() {
            Ok(handles) => handles,
            Err(e) => {
                warn!(error = %e, "enumeration failed, keeping registry unchanged");
                return Err(e);
            }
        };

        let (to_remove, to_add) = self.diff(&attached);
        let mut report = PollReport::default();

        for handle in to_remove {
            if self.remove_device(handle, &mut report) {
                report.disconnected.push(handle);
            }
        }

        for handle in to_add {
            match self.add_device(handle) {
                Ok(AddOutcome::Connected) => report.connected.push(handle),
                Ok(AddOutcome::Ignored) => {
                    self.ignored.insert(handle);
                    report.ignored.push(handle);
                }
                Err(e) => {
                    warn!(%handle, error = %e, "failed to add device");
                    report.fail(handle, e);
                }
            }
        }

        self.update_devices(&mut report);

        if !report.is_quiet() {
            debug!(
                connected = report.connected.len(),
                disconnected = report.disconnected.len(),
                changed = report.changed.len(),
                failures = report.failures.len(),
                "poll cycle complete"
            );
        }

        Ok(report)
    }

    /// Handles to remove in registry order and handles to add in
    /// enumeration order, each without duplicates.
    fn diff(&mut self, attached: &[Handle]) -> (Vec<Handle>, Vec<Handle>) {
        let present: HashSet<Handle> = attached.iter().copied().collect();
        self.ignored.retain(|handle| present.contains(handle));

        let to_remove = self
            .records
            .iter()
            .map(|record| record.handle)
            .filter(|handle| !present.contains(handle))
            .collect();

        let mut seen = HashSet::new();
        let to_add = attached
            .iter()
            .copied()
            .filter(|handle| seen.insert(*handle))
            .filter(|handle| !self.contains(*handle) && !self.ignored.contains(handle))
            .collect();

        (to_remove, to_add)
    }

    /// Returns `false` when a listener already removed the device.
    fn remove_device(&mut self, handle: Handle, report: &mut PollReport) -> bool {
        if !self.contains(handle) {
            return false;
        }

        let listeners = self.listeners.snapshot();
        for listener in &listeners {
            listener.on_device_disconnecting(self, handle);
        }

        let Some(index) = self.position(handle) else {
            return false;
        };
        let record = self.records.remove(index);
        info!(%handle, device = %record.device.info().name, "device disconnected");

        if let Err(e) = self.release(record.device.session()) {
            warn!(%handle, error = %e, "failed to release device session");
            report.fail(handle, e);
        }
        true
    }

    fn add_device(&mut self, handle: Handle) -> Result<AddOutcome> {
        let code = self.transport.device_kind_code(handle)?;
        let session = self.transport.open(handle, &self.config.open_mode)?;

        let device = match self.attach(handle, session, code) {
            Ok(Some(device)) => device,
            Ok(None) => {
                debug!(%handle, code, "no device type for kind code, ignoring");
                if let Err(e) = self.release(session) {
                    warn!(%handle, error = %e, "failed to release ignored session");
                }
                return Ok(AddOutcome::Ignored);
            }
            Err(e) => {
                if let Err(release_error) = self.release(session) {
                    warn!(%handle, error = %release_error, "failed to release session");
                }
                return Err(e);
            }
        };

        info!(%handle, %session, device = %device.info().name, kind = %device.kind(), "device connected");
        self.records.push(DeviceRecord { handle, device });

        let listeners = self.listeners.snapshot();
        for listener in &listeners {
            listener.on_device_connected(self, handle);
        }

        Ok(AddOutcome::Connected)
    }

    /// Wait for attachment and construct the device, `None` for a kind
    /// without a constructor.
    fn attach(&self, handle: Handle, session: Session, code: u32) -> Result<Option<Device>> {
        let Some(entry) = devices::lookup_kind(code) else {
            return Ok(None);
        };

        match self
            .transport
            .wait_for_attach(session, self.config.attach_timeout())
        {
            Ok(()) => {}
            Err(HardwareError::Timeout { .. }) => {
                return Err(HardwareError::attach_timeout(
                    handle,
                    self.config.attach_timeout_ms,
                ));
            }
            Err(e) => return Err(e),
        }

        devices::construct(
            entry,
            session,
            self.transport.clone(),
            &self.config.calibration,
        )
        .map(Some)
    }

    /// Close then delete a session. Delete is attempted even when close
    /// fails; the first error is returned.
    fn release(&self, session: Session) -> Result<()> {
        let closed = self.transport.close(session);
        let deleted = self.transport.delete(session);
        closed.and(deleted)
    }

    fn update_devices(&mut self, report: &mut PollReport) {
        for record in &mut self.records {
            match record.device.update() {
                Ok(true) => report.changed.push(record.handle),
                Ok(false) => {}
                Err(e) => {
                    warn!(handle = %record.handle, error = %e, "device update failed");
                    report.fail(record.handle, e);
                }
            }
        }
    }

    /// Disconnect and release every device, in registry order.
    ///
    /// Listeners see each removal as a regular disconnect. Also runs on drop.
    /// Called from a listener while a poll or shutdown is running, it does
    /// nothing and returns an empty report.
    pub fn shutdown(&mut self) -> PollReport {
        if self.polling {
            warn!("shutdown requested during a running pass, ignored");
            return PollReport::default();
        }

        self.polling = true;
        let report = self.release_all();
        self.polling = false;
        report
    }

    fn release_all(&mut self) -> PollReport {
        let mut report = PollReport::default();
        for handle in self.handles() {
            if self.remove_device(handle, &mut report) {
                report.disconnected.push(handle);
            }
        }
        self.ignored.clear();
        report
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        // A pass that unwound leaves the guard set; release regardless.
        if !self.records.is_empty() {
            self.polling = true;
            self.release_all();
        }
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("config", &self.config)
            .field("handles", &self.handles())
            .field("ignored", &self.ignored)
            .field("listeners", &self.listeners)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{AttachBehavior, MockDevice, MockTransport, TransportCall};
    use sensorium_core::OpenMode;
    use std::sync::Mutex;

    fn registry(transport: &Arc<MockTransport>) -> DeviceRegistry {
        DeviceRegistry::new(transport.clone(), RegistryConfig::default()).unwrap()
    }

    #[derive(Default)]
    struct Reentrant {
        results: Mutex<Vec<Result<PollReport>>>,
    }

    impl RegistryListener for Reentrant {
        fn on_device_connected(&self, registry: &mut DeviceRegistry, _handle: Handle) {
            self.results.lock().unwrap().push(registry.poll());
        }
    }

    #[derive(Default)]
    struct ShutdownOnDisconnect {
        seen: Mutex<Vec<Handle>>,
        nested: Mutex<Vec<PollReport>>,
    }

    impl RegistryListener for ShutdownOnDisconnect {
        fn on_device_disconnecting(&self, registry: &mut DeviceRegistry, handle: Handle) {
            self.seen.lock().unwrap().push(handle);
            self.nested.lock().unwrap().push(registry.shutdown());
        }
    }

    #[rstest::rstest]
    #[case::from_poll(false)]
    #[case::from_shutdown(true)]
    fn test_shutdown_inside_notification_is_ignored(#[case] outer_shutdown: bool) {
        let transport = Arc::new(MockTransport::new());
        let a = transport.plug(MockDevice::motion(1));
        let b = transport.plug(MockDevice::thermal(2, 1));
        let mut registry = registry(&transport);
        registry.poll().unwrap();
        let listener = Arc::new(ShutdownOnDisconnect::default());
        registry.add_listener(listener.clone());

        if outer_shutdown {
            let report = registry.shutdown();
            assert_eq!(report.disconnected, vec![a, b]);
            assert_eq!(*listener.seen.lock().unwrap(), vec![a, b]);
        } else {
            transport.unplug(a);
            let report = registry.poll().unwrap();
            assert_eq!(report.disconnected, vec![a]);
            assert_eq!(*listener.seen.lock().unwrap(), vec![a]);
            assert!(registry.contains(b));
        }
        assert!(listener.nested.lock().unwrap().iter().all(PollReport::is_quiet));
    }

    #[test]
    fn test_empty_enumeration_is_quiet() {
        let transport = Arc::new(MockTransport::new());
        let mut registry = registry(&transport);

        let report = registry.poll().unwrap();
        assert!(report.is_quiet());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_diff_deduplicates_enumeration() {
        let transport = Arc::new(MockTransport::new());
        let mut registry = registry(&transport);
        let a = Handle::new(1);
        let b = Handle::new(2);

        let (to_remove, to_add) = registry.diff(&[b, a, b]);
        assert!(to_remove.is_empty());
        assert_eq!(to_add, vec![b, a]);
    }

    #[test]
    fn test_poll_inside_notification_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.plug(MockDevice::thermal(1, 1));
        let mut registry = registry(&transport);
        let listener = Arc::new(Reentrant::default());
        registry.add_listener(listener.clone());

        registry.poll().unwrap();

        let results = listener.results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], Err(HardwareError::PollInProgress));
        drop(results);
        assert!(registry.poll().is_ok());
    }

    #[test]
    fn test_unknown_kind_is_not_reopened() {
        let transport = Arc::new(MockTransport::new());
        let handle = transport.plug(MockDevice::unknown(0x7d));
        let mut registry = registry(&transport);

        let report = registry.poll().unwrap();
        assert_eq!(report.ignored, vec![handle]);
        assert_eq!(transport.open_sessions(), 0);

        transport.clear_calls();
        let report = registry.poll().unwrap();
        assert!(report.ignored.is_empty());
        assert_eq!(transport.calls(), vec![TransportCall::Enumerate]);
    }

    #[test]
    fn test_ignored_handle_forgotten_after_it_leaves() {
        let transport = Arc::new(MockTransport::new());
        let handle = transport.plug(MockDevice::unknown(0x7d));
        let mut registry = registry(&transport);

        registry.poll().unwrap();
        transport.unplug(handle);
        registry.poll().unwrap();
        assert!(registry.ignored.is_empty());
    }

    #[test]
    fn test_contention_fails_add_and_retries() {
        let transport = Arc::new(MockTransport::new());
        let handle = transport.plug(MockDevice::motion(1).with_attach(AttachBehavior::Claimed));
        let mut registry = registry(&transport);

        let report = registry.poll().unwrap();
        assert!(report.connected.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error, HardwareError::contention(handle));

        transport.set_attach(handle, AttachBehavior::Immediate);
        let report = registry.poll().unwrap();
        assert_eq!(report.connected, vec![handle]);
    }

    #[test]
    fn test_remote_registry_reports_server_state() {
        let transport = Arc::new(MockTransport::new());
        let config = RegistryConfig::default().with_open_mode(OpenMode::RemoteById {
            server_id: "lab".into(),
            password: String::new(),
        });
        let registry = DeviceRegistry::new(transport.clone(), config).unwrap();

        assert!(!registry.is_local());
        transport.set_server_connected(false);
        assert!(!registry.is_server_connected().unwrap());
    }

    #[test]
    fn test_local_registry_always_connected() {
        let transport = Arc::new(MockTransport::new());
        transport.set_server_connected(false);
        let registry = registry(&transport);

        assert!(registry.is_local());
        assert!(registry.is_server_connected().unwrap());
        assert!(!registry.library_version().unwrap().is_empty());
        assert_eq!(registry.error_description(0).unwrap(), "No error");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(MockTransport::new());
        let config = RegistryConfig {
            attach_timeout_ms: 0,
            ..RegistryConfig::default()
        };
        assert!(DeviceRegistry::new(transport, config).is_err());
    }

    #[test]
    fn test_drop_releases_sessions() {
        let transport = Arc::new(MockTransport::new());
        transport.plug(MockDevice::motion(1));
        transport.plug(MockDevice::thermal(2, 2));

        let mut registry = registry(&transport);
        registry.poll().unwrap();
        assert_eq!(transport.open_sessions(), 2);

        drop(registry);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[test]
    fn test_shutdown_reports_disconnects_in_order() {
        let transport = Arc::new(MockTransport::new());
        let a = transport.plug(MockDevice::motion(1));
        let b = transport.plug(MockDevice::thermal(2, 2));
        let mut registry = registry(&transport);
        registry.poll().unwrap();

        let report = registry.shutdown();
        assert_eq!(report.disconnected, vec![a, b]);
        assert!(registry.is_empty());
    }
}
