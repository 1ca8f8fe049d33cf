//! Host-side driver for Ismatec Reglo ICC peristaltic pumps.
//!
//! reglo talks to the pump over its USB virtual COM port (or RS-232) and
//! exposes a blocking, thread-safe session for volume/flow-rate pumping on
//! independently addressed channels.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial port transport and USB discovery
//! - [`frame`]: command and response wire codec
//! - [`pump`]: device session, transaction engine and calibration model
//!
//! ```no_run
//! use reglo::pump::{PumpSession, SessionConfig};
//! use reglo::transport::SerialConfig;
//!
//! let session = PumpSession::open_first_device(&SerialConfig::default(), SessionConfig::default())?;
//! session.dispense_vol(1, 2.5, 1.0)?;
//! session.wait_for_stop(1, session.config().poll_interval, session.config().wait_timeout)?;
//! # Ok::<(), reglo::pump::PumpError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use reglo_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use reglo_frame::*;
}

/// Re-export session types.
pub mod pump {
    pub use reglo_pump::*;
}

pub use reglo_pump::{PumpDirection, PumpError, PumpSession, SessionConfig};
