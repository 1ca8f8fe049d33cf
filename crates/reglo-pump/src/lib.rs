//! Device session management for Reglo ICC peristaltic pumps.
//!
//! This is the "just works" layer. Open a session by port name, USB
//! location or serial number, then pump volumes at flow rates on
//! individual channels and wait for them to finish.
//!
//! All commands go through one [`TransactionEngine`] per session, so a
//! session can be shared between threads behind an `Arc`.

pub mod calibration;
pub mod clock;
pub mod commands;
pub mod config;
pub mod connector;
pub mod direction;
pub mod engine;
pub mod error;
pub mod identity;
pub mod session;

pub use calibration::{
    run_time, signed_volume, CalibrationTable, ChannelCalibration, PumpLimits, TubingId,
    SUPPORTED_TUBING_IDS_MM,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SessionConfig, TransactionConfig, DEFAULT_PUMP_ADDRESS};
pub use connector::{connect, DeviceSelector};
pub use direction::PumpDirection;
pub use engine::{Exchange, TransactionEngine};
pub use error::{ErrorKind, PumpError, RemoteError, Result};
pub use identity::DeviceIdentity;
pub use session::PumpSession;
