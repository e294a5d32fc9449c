//! Mock transport for testing and development.
//!
//! [`MockTransport`] implements [`Transport`](crate::Transport) over an
//! in-memory bench of [`MockDevice`]s that tests plug, unplug and drive
//! programmatically without physical hardware.

pub mod device;
pub mod transport;

// Re-export commonly used types
pub use device::{AttachBehavior, MockDevice};
pub use transport::{MockTransport, ReadPoint, TransportCall};
