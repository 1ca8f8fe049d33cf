use std::fmt;
use std::io;

use reglo_pump::{ErrorKind, PumpError};
use reglo_transport::TransportError;

// Process exit codes, shared with the other 3leaps CLIs.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
/// Interrupted by Ctrl-C (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => TRANSPORT_ERROR,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = err.io_kind().map(io_code).unwrap_or(TRANSPORT_ERROR);
    CliError::new(code, format!("{context}: {err}"))
}

pub fn pump_error(context: &str, err: PumpError) -> CliError {
    let code = match &err {
        PumpError::Transport(inner) => inner.io_kind().map(io_code).unwrap_or(TRANSPORT_ERROR),
        PumpError::ConfigFile { source, .. } => match source.kind() {
            io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
            _ => USAGE,
        },
        _ => match err.kind() {
            ErrorKind::DeviceNotFound => TRANSPORT_ERROR,
            ErrorKind::CommandTimeout => TIMEOUT,
            ErrorKind::InvalidResponse | ErrorKind::Frame | ErrorKind::Config => DATA_INVALID,
            ErrorKind::InvalidFlowRate
            | ErrorKind::InvalidVolume
            | ErrorKind::InvalidTubingId
            | ErrorKind::InvalidChannel
                if !err.is_remote() =>
            {
                USAGE
            }
            ErrorKind::Transport => TRANSPORT_ERROR,
            _ => FAILURE,
        },
    };
    CliError::new(code, format!("{context}: {err}"))
}
