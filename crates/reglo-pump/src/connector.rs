//! Opening sessions by port name, USB location or serial number.

use std::sync::Arc;

use reglo_transport::{
    Discovery, PortCandidate, SerialConfig, SerialTransport, Transport, UsbDiscovery,
};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{ErrorKind, PumpError, Result};
use crate::session::PumpSession;

/// How to pick a device among the attached candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// First candidate in enumeration order.
    First,
    /// Candidate at this USB topology location.
    UsbLocation(String),
    /// The candidate whose pump reports this serial number.
    SerialNo(String),
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => f.write_str("first available device"),
            Self::UsbLocation(location) => write!(f, "USB location {location}"),
            Self::SerialNo(serial_no) => write!(f, "serial number {serial_no}"),
        }
    }
}

/// Select a candidate from `discovery`, open it with `open` and establish a
/// session.
///
/// For [`DeviceSelector::SerialNo`] each candidate is probed in turn; ports
/// that fail to open, fail to answer or report another serial number are
/// skipped.
pub fn connect<D, T, F>(
    discovery: &D,
    selector: &DeviceSelector,
    mut open: F,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
) -> Result<PumpSession<T>>
where
    D: Discovery + ?Sized,
    T: Transport,
    F: FnMut(&PortCandidate) -> Result<T>,
{
    let candidates = discovery.candidates()?;
    debug!(count = candidates.len(), %selector, "discovered candidates");

    match selector {
        DeviceSelector::First => {
            let candidate = candidates
                .first()
                .ok_or_else(|| PumpError::DeviceNotFound(selector.to_string()))?;
            PumpSession::establish_with_clock(open(candidate)?, config, clock)
        }
        DeviceSelector::UsbLocation(location) => {
            let candidate = candidates
                .iter()
                .find(|c| c.location.as_deref() == Some(location.as_str()))
                .ok_or_else(|| PumpError::DeviceNotFound(selector.to_string()))?;
            PumpSession::establish_with_clock(open(candidate)?, config, clock)
        }
        DeviceSelector::SerialNo(serial_no) => {
            let config = SessionConfig {
                serial_no: Some(serial_no.clone()),
                ..config
            };
            for candidate in &candidates {
                let transport = match open(candidate) {
                    Ok(transport) => transport,
                    Err(err) => {
                        debug!(port = %candidate.port_name, error = %err, "skipping port");
                        continue;
                    }
                };
                match PumpSession::establish_with_clock(transport, config.clone(), clock.clone())
                {
                    Ok(session) => return Ok(session),
                    Err(err) if probe_can_continue(&err) => {
                        debug!(port = %candidate.port_name, error = %err, "skipping port");
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(PumpError::DeviceNotFound(selector.to_string()))
        }
    }
}

fn probe_can_continue(err: &PumpError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::SerialNoMismatch
            | ErrorKind::CommandTimeout
            | ErrorKind::InvalidResponse
            | ErrorKind::RemoteError
            | ErrorKind::Transport
    )
}

fn open_serial(candidate: &PortCandidate, serial: &SerialConfig) -> Result<SerialTransport> {
    Ok(SerialTransport::open(&candidate.port_name, serial)?)
}

impl PumpSession<SerialTransport> {
    /// Open a session on a named serial port, e.g. `/dev/ttyACM0` or `COM3`.
    pub fn from_serial_portname(
        port_name: &str,
        serial: &SerialConfig,
        config: SessionConfig,
    ) -> Result<Self> {
        let transport = SerialTransport::open(port_name, serial)?;
        info!(port = port_name, "opening pump session");
        Self::establish(transport, config)
    }

    /// Open a session on the first attached pump.
    pub fn open_first_device(serial: &SerialConfig, config: SessionConfig) -> Result<Self> {
        Self::open_with(&DeviceSelector::First, serial, config)
    }

    /// Open a session on the pump at a USB topology location.
    pub fn from_usb_location(
        location: &str,
        serial: &SerialConfig,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::open_with(
            &DeviceSelector::UsbLocation(location.to_string()),
            serial,
            config,
        )
    }

    /// Open a session on the attached pump with this serial number.
    pub fn open_by_serial_no(
        serial_no: &str,
        serial: &SerialConfig,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::open_with(
            &DeviceSelector::SerialNo(serial_no.to_string()),
            serial,
            config,
        )
    }

    fn open_with(
        selector: &DeviceSelector,
        serial: &SerialConfig,
        config: SessionConfig,
    ) -> Result<Self> {
        connect(
            &UsbDiscovery::default(),
            selector,
            |candidate| open_serial(candidate, serial),
            config,
            Arc::new(SystemClock),
        )
    }
}
