//! Tubing calibration and the volume/flow model.
//!
//! Each channel's tubing inner diameter fixes how much liquid one head
//! revolution moves (`ml_per_rev = k * d^2`). Together with the motor speed
//! range that bounds the flow rates the channel can deliver. Everything here
//! is pure computation; nothing touches the transport.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use reglo_frame::format_type2;
use serde::{Deserialize, Serialize};

use crate::direction::PumpDirection;
use crate::error::{PumpError, Result};

/// Inner diameters (mm) of the 2-stop tubing the pump accepts.
pub const SUPPORTED_TUBING_IDS_MM: [f64; 26] = [
    0.13, 0.19, 0.25, 0.38, 0.44, 0.51, 0.57, 0.64, 0.76, 0.89, 0.95, 1.02, 1.09, 1.14, 1.22, 1.30,
    1.42, 1.52, 1.65, 1.75, 1.85, 2.06, 2.29, 2.54, 2.79, 3.17,
];

const TUBING_ID_TOLERANCE_MM: f64 = 0.005;

/// A supported tubing inner diameter, stored in hundredths of a millimetre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TubingId(u16);

impl TubingId {
    /// Match `mm` against the supported set.
    pub fn from_mm(mm: f64) -> Option<Self> {
        if !mm.is_finite() {
            return None;
        }
        SUPPORTED_TUBING_IDS_MM
            .iter()
            .find(|&&supported| (supported - mm).abs() <= TUBING_ID_TOLERANCE_MM)
            .map(|&supported| Self((supported * 100.0).round() as u16))
    }

    /// Wire value: hundredths of a millimetre.
    pub fn hundredths(self) -> u16 {
        self.0
    }

    pub fn mm(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

/// Nominal drive figures for an 8-roller head, used for the reported
/// flow ranges. Requests are not checked against them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpLimits {
    /// Slowest supported head speed. Default: 0.1 rpm.
    pub min_speed_rpm: f64,
    /// Fastest supported head speed. Default: 100 rpm.
    pub max_speed_rpm: f64,
    /// Displacement per revolution per squared millimetre of tubing ID.
    pub ml_per_rev_per_mm2: f64,
}

impl Default for PumpLimits {
    fn default() -> Self {
        Self {
            min_speed_rpm: 0.1,
            max_speed_rpm: 100.0,
            ml_per_rev_per_mm2: 0.0348,
        }
    }
}

/// Per-channel calibration derived from the tubing inner diameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelCalibration {
    pub channel: u8,
    pub inner_diameter_mm: f64,
    pub ml_per_rev: f64,
}

impl ChannelCalibration {
    pub fn new(channel: u8, inner_diameter_mm: f64, limits: &PumpLimits) -> Self {
        Self {
            channel,
            inner_diameter_mm,
            ml_per_rev: limits.ml_per_rev_per_mm2 * inner_diameter_mm * inner_diameter_mm,
        }
    }

    /// Flow rates (mL/min) this channel can deliver.
    pub fn flow_rate_range(&self, limits: &PumpLimits) -> RangeInclusive<f64> {
        self.flow_rate_at(limits.min_speed_rpm)..=self.flow_rate_at(limits.max_speed_rpm)
    }

    /// Flow rate (mL/min) at the given head speed.
    pub fn flow_rate_at(&self, rpm: f64) -> f64 {
        rpm * self.ml_per_rev
    }

    /// Head speed (rpm) needed for the given flow rate.
    pub fn speed_for(&self, rate_ml_per_min: f64) -> f64 {
        rate_ml_per_min / self.ml_per_rev
    }
}

/// Per-channel calibrations of one session.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    channels: BTreeMap<u8, ChannelCalibration>,
}

impl CalibrationTable {
    pub fn insert(&mut self, calibration: ChannelCalibration) {
        self.channels.insert(calibration.channel, calibration);
    }

    pub fn get(&self, channel: u8) -> Option<&ChannelCalibration> {
        self.channels.get(&channel)
    }

    /// Tubing inner diameter per channel.
    pub fn inner_diameters(&self) -> BTreeMap<u8, f64> {
        self.channels
            .values()
            .map(|c| (c.channel, c.inner_diameter_mm))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelCalibration> {
        self.channels.values()
    }
}

/// Reject volumes that are not positive or cannot be sent to the pump.
pub fn validate_volume(channel: u8, volume_ml: f64) -> Result<()> {
    if !(volume_ml.is_finite() && volume_ml > 0.0) || format_type2(volume_ml).is_err() {
        return Err(PumpError::InvalidVolume {
            channel,
            volume: volume_ml,
        });
    }
    Ok(())
}

/// Reject flow rates that are not positive or cannot be sent to the pump.
///
/// The usable range depends on the pump head and tubing, which only the pump
/// knows; it answers `#` to a rate it cannot deliver.
pub fn validate_flow_rate(channel: u8, rate_ml_per_min: f64) -> Result<()> {
    if !(rate_ml_per_min.is_finite() && rate_ml_per_min > 0.0)
        || format_type2(rate_ml_per_min).is_err()
    {
        return Err(PumpError::InvalidFlowRate {
            channel,
            rate: rate_ml_per_min,
        });
    }
    Ok(())
}

/// Reject flow rates outside the range `limits` gives for this channel.
pub fn check_flow_range(
    calibration: &ChannelCalibration,
    rate_ml_per_min: f64,
    limits: &PumpLimits,
) -> Result<()> {
    if !calibration.flow_rate_range(limits).contains(&rate_ml_per_min) {
        return Err(PumpError::InvalidFlowRate {
            channel: calibration.channel,
            rate: rate_ml_per_min,
        });
    }
    Ok(())
}

/// Expected pumping time for a volume at a flow rate.
pub fn run_time(volume_ml: f64, rate_ml_per_min: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(volume_ml / rate_ml_per_min * 60.0).ok()
}

/// Volume signed by direction: clockwise positive.
pub fn signed_volume(direction: PumpDirection, volume_ml: f64) -> f64 {
    direction.sign() * volume_ml
}
