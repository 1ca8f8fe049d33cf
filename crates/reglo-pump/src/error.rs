use std::time::Duration;

use bytes::Bytes;

/// A fault reported by the pump itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The pump answered `#` (command not executed).
    #[error("pump refused {command} on {target}")]
    CommandFailed { command: String, target: String },

    /// The channel motor stopped advancing while reported as running.
    #[error("stall detected on channel {channel}")]
    StallDetectionDetected { channel: u8 },

    /// The pump refused the requested flow rate.
    #[error("pump rejected flow rate {rate} mL/min on channel {channel}")]
    InvalidFlowRate { channel: u8, rate: f64 },

    /// The pump refused the requested volume.
    #[error("pump rejected volume {volume} mL on channel {channel}")]
    InvalidVolume { channel: u8, volume: f64 },

    /// The pump refused the tubing inner diameter.
    #[error("pump rejected tubing inner diameter {inner_diameter} mm on channel {channel}")]
    InvalidTubingId { channel: u8, inner_diameter: f64 },
}

/// Errors that can occur in pump operations.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// No attached device matched the selection.
    #[error("no pump found: {0}")]
    DeviceNotFound(String),

    /// The device reports a different serial number than requested.
    #[error("serial number mismatch: expected {expected}, device reports {reported}")]
    SerialNoMismatch { expected: String, reported: String },

    /// No valid reply arrived within the timeout, after all attempts.
    #[error("{command} timed out after {attempts} attempt(s) of {timeout:?}")]
    CommandTimeout {
        command: String,
        attempts: u32,
        timeout: Duration,
    },

    /// The reply was malformed or did not have the expected shape.
    #[error("invalid response to {command} ({reason}): {raw:?}")]
    InvalidResponse {
        command: String,
        raw: Bytes,
        reason: String,
    },

    /// The pump reported a fault.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Flow rate not positive or not encodable. Nothing was sent.
    #[error("invalid flow rate {rate} mL/min for channel {channel}")]
    InvalidFlowRate { channel: u8, rate: f64 },

    /// Volume not positive or not encodable. Nothing was sent.
    #[error("invalid volume {volume} mL for channel {channel}")]
    InvalidVolume { channel: u8, volume: f64 },

    /// Tubing inner diameter not in the supported set. Nothing was sent.
    #[error("unsupported tubing inner diameter {0} mm")]
    InvalidTubingId(f64),

    /// Channel number not present on this pump. Nothing was sent.
    #[error("channel {channel} not available (pump has {channels:?})")]
    InvalidChannel { channel: u8, channels: Vec<u8> },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] reglo_transport::TransportError),

    /// A command could not be encoded.
    #[error("frame error: {0}")]
    Frame(#[from] reglo_frame::FrameError),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Flat classification of [`PumpError`], independent of local/remote origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceNotFound,
    SerialNoMismatch,
    CommandTimeout,
    InvalidResponse,
    RemoteError,
    StallDetectionDetected,
    InvalidFlowRate,
    InvalidVolume,
    InvalidTubingId,
    InvalidChannel,
    Transport,
    Frame,
    Config,
}

impl PumpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Self::SerialNoMismatch { .. } => ErrorKind::SerialNoMismatch,
            Self::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            Self::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            Self::Remote(RemoteError::CommandFailed { .. }) => ErrorKind::RemoteError,
            Self::Remote(RemoteError::StallDetectionDetected { .. }) => {
                ErrorKind::StallDetectionDetected
            }
            Self::Remote(RemoteError::InvalidFlowRate { .. }) | Self::InvalidFlowRate { .. } => {
                ErrorKind::InvalidFlowRate
            }
            Self::Remote(RemoteError::InvalidVolume { .. }) | Self::InvalidVolume { .. } => {
                ErrorKind::InvalidVolume
            }
            Self::Remote(RemoteError::InvalidTubingId { .. }) | Self::InvalidTubingId(_) => {
                ErrorKind::InvalidTubingId
            }
            Self::InvalidChannel { .. } => ErrorKind::InvalidChannel,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Frame(_) => ErrorKind::Frame,
            Self::Config(_) | Self::ConfigFile { .. } => ErrorKind::Config,
        }
    }

    /// True when the pump itself reported the fault.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// True for failures the transaction engine retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. } | Self::InvalidResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PumpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ignores_origin() {
        let local = PumpError::InvalidFlowRate {
            channel: 1,
            rate: -1.0,
        };
        let remote = PumpError::from(RemoteError::InvalidFlowRate {
            channel: 1,
            rate: 100.0,
        });

        assert_eq!(local.kind(), ErrorKind::InvalidFlowRate);
        assert_eq!(remote.kind(), ErrorKind::InvalidFlowRate);
        assert!(!local.is_remote());
        assert!(remote.is_remote());
    }

    #[test]
    fn stall_is_a_remote_fault() {
        let err = PumpError::from(RemoteError::StallDetectionDetected { channel: 2 });
        assert_eq!(err.kind(), ErrorKind::StallDetectionDetected);
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "remote error: stall detected on channel 2");
    }

    #[test]
    fn transient_classification() {
        let timeout = PumpError::CommandTimeout {
            command: "xS (pump 1)".to_string(),
            attempts: 3,
            timeout: Duration::from_secs(2),
        };
        assert!(timeout.is_transient());
        assert!(!PumpError::InvalidTubingId(1.0).is_transient());
        assert!(!PumpError::from(RemoteError::CommandFailed {
            command: "H".to_string(),
            target: "pump 1 channel 1".to_string(),
        })
        .is_transient());
    }
}
