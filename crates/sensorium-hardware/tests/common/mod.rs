//! Common test utilities for integration tests.
//!
//! Provides a registry built over a [`MockTransport`], a registry listener
//! that records every notification it gets, and a device listener that
//! counts change notifications.
//!
//! # Usage
//!
//! ```ignore
//! let bench = common::Bench::new();
//! let handle = bench.transport.plug(MockDevice::motion(1));
//! bench.registry().poll().unwrap();
//! assert_eq!(bench.events(), vec![Event::Connected(handle)]);
//! ```

#![allow(dead_code)]

use sensorium_core::{Handle, Session};
use sensorium_hardware::mock::{MockTransport, TransportCall};
use sensorium_hardware::{Device, DeviceListener, DeviceRegistry, RegistryConfig, RegistryListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One registry notification as seen by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected(Handle),
    Disconnecting {
        handle: Handle,
        /// Whether the device was still reachable through the registry.
        present: bool,
        /// Whether its session had already been closed.
        closed: bool,
    },
}

/// Records connect and disconnect notifications in order.
pub struct RecordingListener {
    transport: Arc<MockTransport>,
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn new(transport: Arc<MockTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn closed(&self, session: Session) -> bool {
        self.transport
            .calls()
            .contains(&TransportCall::Close { session })
    }
}

impl RegistryListener for RecordingListener {
    fn on_device_connected(&self, _registry: &mut DeviceRegistry, handle: Handle) {
        self.events.lock().unwrap().push(Event::Connected(handle));
    }

    fn on_device_disconnecting(&self, registry: &mut DeviceRegistry, handle: Handle) {
        let device = registry.device(handle);
        let event = Event::Disconnecting {
            handle,
            present: device.is_some(),
            closed: device.is_some_and(|d| self.closed(d.session())),
        };
        self.events.lock().unwrap().push(event);
    }
}

/// Counts change notifications from every device it is attached to.
#[derive(Default)]
pub struct ChangeCounter {
    hits: AtomicUsize,
}

impl ChangeCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl DeviceListener for ChangeCounter {
    fn on_device_changed(&self, _device: &mut Device) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// A registry over a mock transport with a recording listener installed.
pub struct Bench {
    pub transport: Arc<MockTransport>,
    pub recorder: Arc<RecordingListener>,
    pub registry: DeviceRegistry,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let recorder = RecordingListener::new(transport.clone());
        let mut registry =
            DeviceRegistry::new(transport.clone(), config).expect("valid registry config");
        registry.add_listener(recorder.clone());

        Self {
            transport,
            recorder,
            registry,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorder.events()
    }

    /// Attach a change counter to the device behind `handle`.
    pub fn count_changes(&mut self, handle: Handle) -> Arc<ChangeCounter> {
        let counter = ChangeCounter::new();
        self.registry
            .device_mut(handle)
            .expect("device is registered")
            .add_listener(counter.clone());
        counter
    }
}

/// Assert that the sessions were closed and deleted, close first.
pub fn assert_released(calls: &[TransportCall], session: Session) {
    let close = calls
        .iter()
        .position(|call| *call == TransportCall::Close { session })
        .unwrap_or_else(|| panic!("{session} was never closed"));
    let delete = calls
        .iter()
        .position(|call| *call == TransportCall::Delete { session })
        .unwrap_or_else(|| panic!("{session} was never deleted"));
    assert!(close < delete, "{session} deleted before it was closed");
}
