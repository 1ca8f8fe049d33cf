use std::fmt;
use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};

use crate::address::Address;
use crate::codec::{encode_command, ResponseShape};
use crate::error::{FrameError, Result};

/// Whether a mnemonic addresses the pump or a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Pump,
    Channel,
}

/// Command mnemonics understood by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    /// `~`: enable independent channel addressing.
    EnableChannelAddressing,
    /// `xA`: number of channels.
    ChannelCount,
    /// `xS`: pump serial number.
    SerialNumber,
    /// `#`: model, software version and pump head code.
    PumpInfo,
    /// `DA`: show text on the pump display.
    DisplayText,
    /// `++` with a parameter: set tubing inner diameter.
    SetTubingDiameter,
    /// `++` without a parameter: query tubing inner diameter.
    TubingDiameter,
    /// `J`: clockwise rotation.
    Clockwise,
    /// `K`: counter-clockwise rotation.
    CounterClockwise,
    /// `O`: volume-over-time dispense mode.
    VolumeTimeMode,
    /// `xff`: derive motor speed from the flow rate.
    SpeedFromFlowRate,
    /// `vv`: dispense volume in mL.
    SetVolume,
    /// `ff`: flow rate in mL/min.
    SetFlowRate,
    /// `H`: start.
    Start,
    /// `I`: stop.
    Stop,
    /// `E`: is the channel running.
    RunState,
    /// `xXX`: motor odometer.
    Odometer,
}

/// Wire text ordered so longer mnemonics are matched before their prefixes.
pub(crate) const MNEMONIC_TABLE: &[(&str, Mnemonic)] = &[
    ("xXX", Mnemonic::Odometer),
    ("xff", Mnemonic::SpeedFromFlowRate),
    ("xA", Mnemonic::ChannelCount),
    ("xS", Mnemonic::SerialNumber),
    ("DA", Mnemonic::DisplayText),
    ("++", Mnemonic::TubingDiameter),
    ("vv", Mnemonic::SetVolume),
    ("ff", Mnemonic::SetFlowRate),
    ("~", Mnemonic::EnableChannelAddressing),
    ("#", Mnemonic::PumpInfo),
    ("J", Mnemonic::Clockwise),
    ("K", Mnemonic::CounterClockwise),
    ("O", Mnemonic::VolumeTimeMode),
    ("H", Mnemonic::Start),
    ("I", Mnemonic::Stop),
    ("E", Mnemonic::RunState),
];

impl Mnemonic {
    /// Wire text of the mnemonic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnableChannelAddressing => "~",
            Self::ChannelCount => "xA",
            Self::SerialNumber => "xS",
            Self::PumpInfo => "#",
            Self::DisplayText => "DA",
            Self::SetTubingDiameter | Self::TubingDiameter => "++",
            Self::Clockwise => "J",
            Self::CounterClockwise => "K",
            Self::VolumeTimeMode => "O",
            Self::SpeedFromFlowRate => "xff",
            Self::SetVolume => "vv",
            Self::SetFlowRate => "ff",
            Self::Start => "H",
            Self::Stop => "I",
            Self::RunState => "E",
            Self::Odometer => "xXX",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::EnableChannelAddressing
            | Self::ChannelCount
            | Self::SerialNumber
            | Self::PumpInfo
            | Self::DisplayText => Scope::Pump,
            _ => Scope::Channel,
        }
    }

    /// Shape of the reply the pump sends for this mnemonic.
    pub fn response_shape(&self) -> ResponseShape {
        match self {
            Self::ChannelCount
            | Self::SerialNumber
            | Self::PumpInfo
            | Self::TubingDiameter
            | Self::SetVolume
            | Self::SetFlowRate
            | Self::Odometer => ResponseShape::Line,
            _ => ResponseShape::Status,
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Zero-padded decimal of exactly `width` digits.
    Digits { value: u32, width: usize },
    /// Unpadded decimal.
    Number(u32),
    /// Volume/flow value in the pump's "type 2" notation.
    Type2(f64),
    /// Printable ASCII text.
    Text(String),
}

impl Param {
    fn render(&self, mnemonic: Mnemonic, out: &mut String) -> Result<()> {
        let invalid = |reason: String| FrameError::InvalidParameter {
            mnemonic: mnemonic.as_str(),
            reason,
        };
        match self {
            Self::Digits { value, width } => {
                let width = *width;
                let rendered = format!("{value:0width$}");
                if rendered.len() != width {
                    return Err(invalid(format!("{value} does not fit {width} digits")));
                }
                out.push_str(&rendered);
            }
            Self::Number(value) => {
                let _ = write!(out, "{value}");
            }
            Self::Type2(value) => {
                let rendered = format_type2(*value).map_err(|_| {
                    invalid(format!("{value} cannot be expressed in type 2 notation"))
                })?;
                out.push_str(&rendered);
            }
            Self::Text(text) => {
                if let Some(bad) = text.chars().find(|c| !is_printable(*c)) {
                    return Err(invalid(format!("non-printable character {bad:?}")));
                }
                out.push_str(text);
            }
        }
        Ok(())
    }
}

fn is_printable(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control()
}

/// Render a non-negative value in "type 2" notation: four mantissa digits
/// followed by a signed single-digit exponent.
///
/// ```
/// assert_eq!(reglo_frame::format_type2(2.5e-3).unwrap(), "2500-3");
/// assert_eq!(reglo_frame::format_type2(12.0).unwrap(), "1200+1");
/// ```
pub fn format_type2(value: f64) -> Result<String> {
    let reject = || FrameError::InvalidParameter {
        mnemonic: "type2",
        reason: format!("{value} out of range"),
    };
    if !value.is_finite() || value < 0.0 {
        return Err(reject());
    }

    let scientific = format!("{value:.3e}");
    let (mantissa, exponent) = scientific.split_once('e').ok_or_else(reject)?;
    let exponent: i32 = exponent.parse().map_err(|_| reject())?;
    if !(-9..=9).contains(&exponent) {
        return Err(reject());
    }
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    Ok(format!("{digits}{exponent:+}"))
}

/// A command ready for encoding. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    address: Address,
    mnemonic: Mnemonic,
    params: Vec<Param>,
}

impl CommandFrame {
    pub fn new(address: Address, mnemonic: Mnemonic) -> Self {
        Self {
            address,
            mnemonic,
            params: Vec::new(),
        }
    }

    /// Append a parameter.
    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Shape of the expected reply.
    pub fn response_shape(&self) -> ResponseShape {
        self.mnemonic.response_shape()
    }

    /// Parameters as they appear on the wire.
    pub fn rendered_params(&self) -> Result<String> {
        let mut out = String::new();
        for param in &self.params {
            param.render(self.mnemonic, &mut out)?;
        }
        Ok(out)
    }

    /// Encode into wire bytes, including the terminator.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(16);
        encode_command(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mnemonic, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type2_notation() {
        assert_eq!(format_type2(2.5e-3).unwrap(), "2500-3");
        assert_eq!(format_type2(1.0).unwrap(), "1000+0");
        assert_eq!(format_type2(0.1234).unwrap(), "1234-1");
        assert_eq!(format_type2(35.0).unwrap(), "3500+1");
        assert_eq!(format_type2(1.23456).unwrap(), "1235+0");
    }

    #[test]
    fn type2_rejects_unrepresentable_values() {
        assert!(format_type2(-1.0).is_err());
        assert!(format_type2(f64::NAN).is_err());
        assert!(format_type2(f64::INFINITY).is_err());
        assert!(format_type2(1e10).is_err());
        assert!(format_type2(1e-10).is_err());
    }

    #[test]
    fn digits_param_must_fit_width() {
        let frame = CommandFrame::new(Address::channel(1, 1), Mnemonic::SetTubingDiameter)
            .with_param(Param::Digits {
                value: 12345,
                width: 4,
            });
        assert!(matches!(
            frame.rendered_params(),
            Err(FrameError::InvalidParameter { mnemonic: "++", .. })
        ));
    }

    #[test]
    fn text_param_rejects_control_characters() {
        let frame = CommandFrame::new(Address::pump(1), Mnemonic::DisplayText)
            .with_param(Param::Text("bad\rtext".to_string()));
        assert!(frame.encode().is_err());
    }

    #[test]
    fn mnemonic_table_covers_every_wire_text() {
        for (text, mnemonic) in MNEMONIC_TABLE {
            assert_eq!(mnemonic.as_str(), *text);
        }
    }

    #[test]
    fn scope_and_shape() {
        assert_eq!(Mnemonic::SerialNumber.scope(), Scope::Pump);
        assert_eq!(Mnemonic::Start.scope(), Scope::Channel);
        assert_eq!(Mnemonic::RunState.response_shape(), ResponseShape::Status);
        assert_eq!(Mnemonic::SetVolume.response_shape(), ResponseShape::Line);
        assert_eq!(
            Mnemonic::SetTubingDiameter.response_shape(),
            ResponseShape::Status
        );
        assert_eq!(Mnemonic::TubingDiameter.response_shape(), ResponseShape::Line);
    }

    #[test]
    fn display_is_mnemonic_and_target() {
        let frame = CommandFrame::new(Address::channel(1, 2), Mnemonic::Start);
        assert_eq!(frame.to_string(), "H (pump 1 channel 2)");
    }
}
