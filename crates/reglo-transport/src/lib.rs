//! Serial transport abstraction for Reglo ICC pumps.
//!
//! Provides a byte-level interface over the pump's USB virtual COM port
//! (or RS-232 adapter):
//! - [`Transport`]: write bytes, read with a bounded timeout, discard stale input
//! - [`SerialTransport`]: the `serialport`-backed implementation
//! - [`UsbDiscovery`]: enumerate candidate ports by USB vendor/product ID
//!
//! This is the lowest layer of reglo. The handle is closed when dropped.

pub mod discovery;
pub mod error;
pub mod serial;
pub mod traits;

pub use discovery::{Discovery, PortCandidate, UsbDiscovery, REGLO_ICC_USB_ID};
pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};
pub use traits::Transport;
