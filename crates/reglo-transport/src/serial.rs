use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::Bytes;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Reglo ICC factory baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const READ_CHUNK_SIZE: usize = 256;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial line settings. The pump speaks 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate. Default: 9600.
    pub baud_rate: u32,
    /// Write timeout for blocking operations. Default: 2 s.
    pub write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// A [`Transport`] over an OS serial port.
pub struct SerialTransport {
    port_name: String,
    port: Box<dyn SerialPort>,
    timeout: Duration,
    config: SerialConfig,
}

impl SerialTransport {
    /// Open `port_name` with the given line settings.
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;

        info!(port = port_name, baud = config.baud_rate, "serial port opened");

        Ok(Self {
            port_name: port_name.to_string(),
            port,
            timeout: config.write_timeout,
            config: config.clone(),
        })
    }

    /// Line settings this transport was opened with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if timeout != self.timeout {
            self.port
                .set_timeout(timeout)
                .map_err(|source| TransportError::Configure {
                    port: self.port_name.clone(),
                    source,
                })?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, timeout: Duration) -> Result<Bytes> {
        self.apply_timeout(timeout)?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.port.read(&mut chunk) {
                Ok(n) => return Ok(Bytes::copy_from_slice(&chunk[..n])),
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(Bytes::new()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.config.write_timeout;
        self.apply_timeout(timeout)?;
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|source| TransportError::Configure {
                port: self.port_name.clone(),
                source,
            })
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!(port = %self.port_name, "closing serial port");
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port_name)
            .field("baud_rate", &self.config.baud_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_pump_factory_settings() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn open_missing_port_reports_port_name() {
        let err = SerialTransport::open("/dev/reglo-does-not-exist", &SerialConfig::default())
            .expect_err("opening a missing port should fail");
        match err {
            TransportError::Open { port, .. } => assert_eq!(port, "/dev/reglo-does-not-exist"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
