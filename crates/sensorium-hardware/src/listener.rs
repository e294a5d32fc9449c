//! Listener bus shared by the registry and by every device.
//!
//! Notification passes never iterate the live list. They take a
//! [`ListenerList::snapshot`] first, so a callback can add or remove
//! listeners (including itself) without disturbing the pass in progress.
//! Changes made during a pass take effect from the next pass.
//!
//! Listeners are identified by the address of their `Arc`: removing a
//! listener requires the same `Arc` (or a clone of it) that was added.

use crate::devices::Device;
use crate::registry::DeviceRegistry;
use sensorium_core::Handle;
use std::fmt;
use std::sync::Arc;

/// Receives change notifications from one device.
///
/// Any `Fn(&mut Device)` closure is a listener:
///
/// ```
/// use std::sync::Arc;
/// use sensorium_hardware::{Device, DeviceListener};
///
/// let listener: Arc<dyn DeviceListener> = Arc::new(|device: &mut Device| {
///     println!("{device}");
/// });
/// ```
pub trait DeviceListener: Send + Sync {
    /// Called once per update in which the device's measure changed.
    fn on_device_changed(&self, device: &mut Device);
}

impl<F> DeviceListener for F
where
    F: Fn(&mut Device) + Send + Sync,
{
    fn on_device_changed(&self, device: &mut Device) {
        self(device)
    }
}

/// Receives connect and disconnect notifications from a registry.
///
/// Both callbacks get the registry itself, so they can look the device up
/// with [`DeviceRegistry::device_mut`], attach device listeners, or add and
/// remove registry listeners.
pub trait RegistryListener: Send + Sync {
    /// The device behind `handle` has been constructed and inserted.
    fn on_device_connected(&self, registry: &mut DeviceRegistry, handle: Handle) {
        let _ = (registry, handle);
    }

    /// The device behind `handle` is about to be erased and released.
    ///
    /// The device is still reachable through the registry during this call.
    fn on_device_disconnecting(&self, registry: &mut DeviceRegistry, handle: Handle) {
        let _ = (registry, handle);
    }
}

/// Ordered list of listeners with snapshot iteration.
pub struct ListenerList<L: ?Sized> {
    listeners: Vec<Arc<L>>,
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Append a listener. The same listener may be added more than once.
    pub fn add(&mut self, listener: Arc<L>) {
        self.listeners.push(listener);
    }

    /// Remove the first occurrence of `listener`.
    ///
    /// Returns `false` when the listener was not registered.
    pub fn remove(&mut self, listener: &Arc<L>) -> bool {
        match self
            .listeners
            .iter()
            .position(|candidate| same_listener(candidate, listener))
        {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.listeners
            .iter()
            .any(|candidate| same_listener(candidate, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Point-in-time copy used to drive one notification pass.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.clone()
    }
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerList<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.listeners.len())
            .finish()
    }
}

// Address comparison only; vtable pointers of the same type may differ
// between codegen units.
fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
