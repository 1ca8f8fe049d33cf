use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A byte-level, half-duplex link to one pump.
///
/// Implementations must never block in [`read`](Transport::read) past the
/// supplied timeout. Releasing the underlying handle happens on drop.
pub trait Transport: Send {
    /// Read whatever bytes arrive within `timeout`.
    ///
    /// Returns an empty buffer when nothing arrived before the timeout
    /// elapsed. A timeout is not an error at this layer.
    fn read(&mut self, timeout: Duration) -> Result<Bytes>;

    /// Write all of `data` and flush it to the device.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Discard any received bytes that have not been read yet.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable name of the link (port name for serial transports).
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, timeout: Duration) -> Result<Bytes> {
        (**self).read(timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
