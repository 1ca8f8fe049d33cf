//! Command addressing.
//!
//! With channel addressing enabled, the leading digit of a command selects
//! either the whole pump (pump address) or one channel (channel number).
//! Channel commands also repeat the pump address after the mnemonic.

use std::fmt;

use crate::error::{FrameError, Result};

/// Highest address that fits the single-digit wire field.
pub const MAX_ADDRESS: u8 = 9;

/// Target of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Pump-level command.
    Pump(u8),
    /// Channel-level command on the pump at `pump`.
    Channel { pump: u8, channel: u8 },
}

impl Address {
    /// Pump-level address.
    pub fn pump(pump: u8) -> Self {
        Self::Pump(pump)
    }

    /// Channel-level address.
    pub fn channel(pump: u8, channel: u8) -> Self {
        Self::Channel { pump, channel }
    }

    /// The pump address, for either variant.
    pub fn pump_address(&self) -> u8 {
        match *self {
            Self::Pump(pump) | Self::Channel { pump, .. } => pump,
        }
    }

    /// The channel number for channel-level addresses.
    pub fn channel_no(&self) -> Option<u8> {
        match *self {
            Self::Pump(_) => None,
            Self::Channel { channel, .. } => Some(channel),
        }
    }

    /// The digit that leads the command on the wire.
    pub fn leading(&self) -> u8 {
        match *self {
            Self::Pump(pump) => pump,
            Self::Channel { channel, .. } => channel,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let check = |n: u8| {
            if (1..=MAX_ADDRESS).contains(&n) {
                Ok(())
            } else {
                Err(FrameError::InvalidAddress(n))
            }
        };
        match *self {
            Self::Pump(pump) => check(pump),
            Self::Channel { pump, channel } => {
                check(pump)?;
                check(channel)
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pump(pump) => write!(f, "pump {pump}"),
            Self::Channel { pump, channel } => write!(f, "pump {pump} channel {channel}"),
        }
    }
}
