//! Command builders for every pump operation.

use reglo_frame::{Address, CommandFrame, Mnemonic, Param};

use crate::calibration::TubingId;
use crate::direction::PumpDirection;

/// Longest text the pump display accepts.
pub const DISPLAY_TEXT_MAX: usize = 15;

pub fn enable_channel_addressing(pump: u8) -> CommandFrame {
    CommandFrame::new(Address::pump(pump), Mnemonic::EnableChannelAddressing)
        .with_param(Param::Number(1))
}

pub fn channel_count(pump: u8) -> CommandFrame {
    CommandFrame::new(Address::pump(pump), Mnemonic::ChannelCount)
}

pub fn serial_number(pump: u8) -> CommandFrame {
    CommandFrame::new(Address::pump(pump), Mnemonic::SerialNumber)
}

pub fn pump_info(pump: u8) -> CommandFrame {
    CommandFrame::new(Address::pump(pump), Mnemonic::PumpInfo)
}

/// Show `text` on the pump display. Non-printable characters become `?`
/// and the text is cut to [`DISPLAY_TEXT_MAX`] characters.
pub fn display_text(pump: u8, text: &str) -> CommandFrame {
    let text: String = text
        .chars()
        .take(DISPLAY_TEXT_MAX)
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c
            } else {
                '?'
            }
        })
        .collect();
    CommandFrame::new(Address::pump(pump), Mnemonic::DisplayText).with_param(Param::Text(text))
}

pub fn set_tubing_diameter(pump: u8, channel: u8, id: TubingId) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::SetTubingDiameter).with_param(
        Param::Digits {
            value: u32::from(id.hundredths()),
            width: 4,
        },
    )
}

pub fn tubing_diameter(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::TubingDiameter)
}

pub fn direction(pump: u8, channel: u8, direction: PumpDirection) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), direction.mnemonic())
}

pub fn volume_time_mode(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::VolumeTimeMode)
}

pub fn speed_from_flow_rate(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::SpeedFromFlowRate)
        .with_param(Param::Number(1))
}

pub fn set_volume(pump: u8, channel: u8, volume_ml: f64) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::SetVolume)
        .with_param(Param::Type2(volume_ml))
}

pub fn set_flow_rate(pump: u8, channel: u8, rate_ml_per_min: f64) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::SetFlowRate)
        .with_param(Param::Type2(rate_ml_per_min))
}

pub fn start(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::Start)
}

pub fn stop(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::Stop)
}

pub fn run_state(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::RunState)
}

pub fn odometer(pump: u8, channel: u8) -> CommandFrame {
    CommandFrame::new(Address::channel(pump, channel), Mnemonic::Odometer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame: CommandFrame) -> String {
        String::from_utf8(frame.encode().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn pump_level_commands() {
        assert_eq!(wire(enable_channel_addressing(1)), "1~1\r");
        assert_eq!(wire(channel_count(1)), "1xA\r");
        assert_eq!(wire(serial_number(2)), "2xS\r");
        assert_eq!(wire(pump_info(1)), "1#\r");
    }

    #[test]
    fn channel_level_commands() {
        let id = TubingId::from_mm(0.25).unwrap();
        assert_eq!(wire(set_tubing_diameter(1, 2, id)), "2++10025\r");
        assert_eq!(wire(tubing_diameter(1, 2)), "2++1\r");
        assert_eq!(wire(direction(1, 3, PumpDirection::Clockwise)), "3J1\r");
        assert_eq!(
            wire(direction(1, 3, PumpDirection::CounterClockwise)),
            "3K1\r"
        );
        assert_eq!(wire(volume_time_mode(1, 1)), "1O1\r");
        assert_eq!(wire(speed_from_flow_rate(1, 1)), "1xff11\r");
        assert_eq!(wire(set_volume(1, 4, 2.5e-3)), "4vv12500-3\r");
        assert_eq!(wire(set_flow_rate(1, 4, 12.0)), "4ff11200+1\r");
        assert_eq!(wire(start(1, 1)), "1H1\r");
        assert_eq!(wire(stop(1, 1)), "1I1\r");
        assert_eq!(wire(run_state(1, 2)), "2E1\r");
        assert_eq!(wire(odometer(1, 2)), "2xXX1\r");
    }

    #[test]
    fn display_text_is_truncated_and_sanitized() {
        assert_eq!(
            wire(display_text(1, "Hello, pump world!")),
            "1DAHello, pump wor\r"
        );
        assert_eq!(wire(display_text(1, "tab\there")), "1DAtab?here\r");
        assert_eq!(wire(display_text(1, "µL")), "1DA?L\r");
    }
}
