use std::fmt;
use std::str::FromStr;

use reglo_frame::Mnemonic;
use serde::{Deserialize, Serialize};

/// Rotation direction of a pump head, seen from the front of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PumpDirection {
    #[default]
    #[serde(rename = "cw")]
    Clockwise,
    #[serde(rename = "ccw")]
    CounterClockwise,
}

impl PumpDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }

    /// +1 for clockwise, -1 for counter-clockwise.
    pub fn sign(self) -> f64 {
        match self {
            Self::Clockwise => 1.0,
            Self::CounterClockwise => -1.0,
        }
    }

    pub(crate) fn mnemonic(self) -> Mnemonic {
        match self {
            Self::Clockwise => Mnemonic::Clockwise,
            Self::CounterClockwise => Mnemonic::CounterClockwise,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clockwise => "cw",
            Self::CounterClockwise => "ccw",
        }
    }
}

impl fmt::Display for PumpDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PumpDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cw" | "clockwise" => Ok(Self::Clockwise),
            "ccw" | "counterclockwise" | "counter-clockwise" => Ok(Self::CounterClockwise),
            other => Err(format!("unknown direction '{other}' (expected cw or ccw)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for dir in [PumpDirection::Clockwise, PumpDirection::CounterClockwise] {
            assert_ne!(dir.opposite(), dir);
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("CW".parse::<PumpDirection>().unwrap(), PumpDirection::Clockwise);
        assert_eq!(
            "counter-clockwise".parse::<PumpDirection>().unwrap(),
            PumpDirection::CounterClockwise
        );
        assert!("up".parse::<PumpDirection>().is_err());
        assert_eq!(PumpDirection::CounterClockwise.to_string(), "ccw");
    }

    #[test]
    fn serde_uses_short_names() {
        let json = serde_json::to_string(&PumpDirection::CounterClockwise).unwrap();
        assert_eq!(json, "\"ccw\"");
        let dir: PumpDirection = serde_json::from_str("\"cw\"").unwrap();
        assert_eq!(dir, PumpDirection::Clockwise);
    }

    #[test]
    fn wire_mnemonics() {
        assert_eq!(PumpDirection::Clockwise.mnemonic().as_str(), "J");
        assert_eq!(PumpDirection::CounterClockwise.mnemonic().as_str(), "K");
    }
}
