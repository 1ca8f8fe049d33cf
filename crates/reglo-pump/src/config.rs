use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calibration::PumpLimits;
use crate::direction::PumpDirection;
use crate::error::{PumpError, Result};

/// Default pump address on a factory-configured pump.
pub const DEFAULT_PUMP_ADDRESS: u8 = 1;

/// Timeout and retry policy for one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Time allowed for a reply to each attempt. Default: 2 s.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Additional attempts after a timeout or malformed reply. Default: 2.
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 2,
        }
    }
}

impl TransactionConfig {
    /// Upper bound on how long one `execute` call can block.
    pub fn worst_case(&self) -> Duration {
        self.timeout * (self.max_retries + 1)
    }
}

/// Session establishment and runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pump address. Default: 1.
    pub pump_address: u8,
    /// Serial number the device must report, if set.
    pub serial_no: Option<String>,
    pub transaction: TransactionConfig,
    /// Status poll cadence for `wait_for_stop`. Default: 100 ms.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Overall bound for `wait_for_stop`. Default: 5 min.
    #[serde(with = "millis")]
    pub wait_timeout: Duration,
    /// A running channel whose odometer does not move for this long is
    /// treated as stalled. `None` disables stall detection. Default: 2 s.
    #[serde(with = "opt_millis")]
    pub stall_window: Option<Duration>,
    /// Direction that counts as "dispense" per channel. Default: clockwise.
    pub dispense_dirs: BTreeMap<u8, PumpDirection>,
    /// Tubing inner diameters (mm) to apply at establishment. Channels not
    /// listed keep the value stored in the pump.
    pub tubing_ids: BTreeMap<u8, f64>,
    pub limits: PumpLimits,
    /// Also reject flow rates outside the range `limits` gives for the
    /// channel's tubing. Only useful once `limits` is calibrated for the
    /// head in use. Default: false.
    pub check_flow_range: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pump_address: DEFAULT_PUMP_ADDRESS,
            serial_no: None,
            transaction: TransactionConfig::default(),
            poll_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(300),
            stall_window: Some(Duration::from_secs(2)),
            dispense_dirs: BTreeMap::new(),
            tubing_ids: BTreeMap::new(),
            limits: PumpLimits::default(),
            check_flow_range: false,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PumpError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.pump_address, 1);
        assert_eq!(config.transaction.timeout, Duration::from_secs(2));
        assert_eq!(config.transaction.worst_case(), Duration::from_secs(6));
        assert_eq!(config.stall_window, Some(Duration::from_secs(2)));
        assert!(config.tubing_ids.is_empty());
        assert!(!config.check_flow_range);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(
            r#"{
                "serial_no": "A1B2",
                "transaction": { "timeout": 500 },
                "stall_window": null,
                "dispense_dirs": { "2": "ccw" },
                "tubing_ids": { "1": 1.52 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.serial_no.as_deref(), Some("A1B2"));
        assert_eq!(config.transaction.timeout, Duration::from_millis(500));
        assert_eq!(config.transaction.max_retries, 2);
        assert_eq!(config.stall_window, None);
        assert_eq!(
            config.dispense_dirs.get(&2),
            Some(&PumpDirection::CounterClockwise)
        );
        assert_eq!(config.tubing_ids.get(&1), Some(&1.52));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn json_roundtrip() {
        let config = SessionConfig {
            pump_address: 2,
            stall_window: None,
            ..SessionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = SessionConfig::from_json("{ \"pump_address\": \"one\" }").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
