//! Candidate port enumeration.
//!
//! Discovery only lists ports that *might* be a pump, filtered by USB
//! vendor/product ID. Confirming identity is the session's job.

#[cfg(target_os = "linux")]
use std::path::Path;

use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::error::{Result, TransportError};

/// USB vendor/product ID pair of the Reglo ICC virtual COM port.
pub const REGLO_ICC_USB_ID: (u16, u16) = (0x265C, 0x0001);

/// A serial port that matched the discovery filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3").
    pub port_name: String,
    /// USB topology location (e.g., "1-1.2:1.0"), where the OS exposes it.
    pub location: Option<String>,
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// USB serial number string, if reported.
    pub usb_serial: Option<String>,
}

/// Source of candidate ports.
pub trait Discovery {
    /// Enumerate candidates in a deterministic order.
    fn candidates(&self) -> Result<Vec<PortCandidate>>;
}

impl Discovery for Vec<PortCandidate> {
    fn candidates(&self) -> Result<Vec<PortCandidate>> {
        Ok(self.clone())
    }
}

/// Enumerates OS serial ports whose USB IDs match a known pump.
#[derive(Debug, Clone)]
pub struct UsbDiscovery {
    usb_ids: Vec<(u16, u16)>,
}

impl Default for UsbDiscovery {
    fn default() -> Self {
        Self {
            usb_ids: vec![REGLO_ICC_USB_ID],
        }
    }
}

impl UsbDiscovery {
    /// Discover ports matching any of the given `(vid, pid)` pairs.
    pub fn with_usb_ids(usb_ids: impl Into<Vec<(u16, u16)>>) -> Self {
        Self {
            usb_ids: usb_ids.into(),
        }
    }

    /// The `(vid, pid)` pairs this discovery accepts.
    pub fn usb_ids(&self) -> &[(u16, u16)] {
        &self.usb_ids
    }
}

impl Discovery for UsbDiscovery {
    fn candidates(&self) -> Result<Vec<PortCandidate>> {
        let ports = serialport::available_ports().map_err(TransportError::Enumerate)?;
        let candidates = filter_ports(ports, &self.usb_ids);
        debug!(count = candidates.len(), "enumerated pump candidates");
        Ok(candidates)
    }
}

fn filter_ports(ports: Vec<SerialPortInfo>, usb_ids: &[(u16, u16)]) -> Vec<PortCandidate> {
    let mut candidates: Vec<PortCandidate> = ports
        .into_iter()
        .filter_map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) if usb_ids.contains(&(usb.vid, usb.pid)) => {
                Some(PortCandidate {
                    location: usb_location(&info.port_name),
                    port_name: info.port_name,
                    vid: usb.vid,
                    pid: usb.pid,
                    usb_serial: usb.serial_number,
                })
            }
            _ => None,
        })
        .collect();
    candidates.sort_by_key(|c| port_sort_key(&c.port_name));
    candidates.dedup_by(|a, b| a.port_name == b.port_name);
    candidates
}

/// Sort key: ttyACM* first, then ttyUSB*, numerically; everything else by name.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        return (2, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// USB interface path for a tty, read from sysfs.
#[cfg(target_os = "linux")]
fn usb_location(port_name: &str) -> Option<String> {
    let basename = port_name.rsplit('/').next()?;
    let device = Path::new("/sys/class/tty").join(basename).join("device");
    let target = std::fs::read_link(device).ok()?;
    target
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

#[cfg(not(target_os = "linux"))]
fn usb_location(_port_name: &str) -> Option<String> {
    None
}
