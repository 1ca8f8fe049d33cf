use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use reglo_pump::{PumpDirection, PumpSession, SessionConfig};
use reglo_transport::{SerialConfig, SerialTransport};
use tracing::debug;

use crate::exit::{pump_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
pub mod info;
pub mod list;
pub mod msg;
pub mod pump;
pub mod status;
pub mod stop;
pub mod tubing;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached pumps.
    List(ListArgs),
    /// Connect and print pump identity and channel calibration.
    Info(InfoArgs),
    /// Pump a volume in an explicit direction.
    Pump(PumpArgs),
    /// Pump a volume in the channel's dispense direction.
    Dispense(VolumeArgs),
    /// Pump a volume against the channel's dispense direction.
    Aspirate(VolumeArgs),
    /// Stop one channel, or all channels.
    Stop(StopArgs),
    /// Show whether channels are running.
    Status(StatusArgs),
    /// Show or set tubing inner diameters.
    Tubing(TubingArgs),
    /// Show a message on the pump display.
    Msg(MsgArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::List(args) => list::run(args, format),
        Command::Info(args) => info::run(args, device, format),
        Command::Pump(args) => pump::run_pump(args, device, format),
        Command::Dispense(args) => pump::run_dispense(args, device, format),
        Command::Aspirate(args) => pump::run_aspirate(args, device, format),
        Command::Stop(args) => stop::run(args, device, format),
        Command::Status(args) => status::run(args, device, format),
        Command::Tubing(args) => tubing::run(args, device, format),
        Command::Msg(args) => msg::run(args, device),
        Command::Doctor(args) => doctor::run(args, device, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to find the pump and configure the session.
#[derive(Args, Debug, Default, Clone)]
pub struct DeviceArgs {
    /// Serial port of the pump (e.g. /dev/ttyACM0, COM3).
    #[arg(long, value_name = "PORT", global = true, conflicts_with = "location")]
    pub port: Option<String>,
    /// USB location of the pump (e.g. 1-1.2:1.0).
    #[arg(long, value_name = "LOCATION", global = true)]
    pub location: Option<String>,
    /// Serial number the pump must report. Without --port or --location,
    /// every attached pump is probed.
    #[arg(long, value_name = "SERIAL", global = true)]
    pub serial: Option<String>,
    /// Pump address (1-9).
    #[arg(long, value_name = "ADDR", global = true, value_parser = clap::value_parser!(u8).range(1..=9))]
    pub address: Option<u8>,
    /// Session configuration file (JSON). Flags override its values.
    #[arg(long, value_name = "FILE", global = true, env = "REGLO_CONFIG")]
    pub config: Option<PathBuf>,
    /// Reply timeout per command attempt (e.g. 2s, 500ms).
    #[arg(long, value_name = "DURATION", global = true)]
    pub command_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Additional USB IDs to accept, as VID:PID in hex (e.g. 265c:0001).
    #[arg(long = "usb-id", value_name = "VID:PID", value_delimiter = ',')]
    pub usb_ids: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VolumeArgs {
    /// Channel number.
    pub channel: u8,
    /// Volume in mL.
    #[arg(long, short = 'v')]
    pub volume: f64,
    /// Flow rate in mL/min.
    #[arg(long, short = 'r')]
    pub rate: f64,
    /// Block until the channel stops. Ctrl-C stops the channel.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait with --wait (e.g. 90s, 5m).
    #[arg(long, value_name = "DURATION")]
    pub wait_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct PumpArgs {
    #[command(flatten)]
    pub volume: VolumeArgs,
    /// Rotation direction (cw or ccw).
    #[arg(long, short = 'd', default_value = "cw")]
    pub direction: PumpDirection,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Channel to stop. Default: all channels.
    pub channel: Option<u8>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Channel to query. Default: all channels.
    pub channel: Option<u8>,
}

#[derive(Args, Debug)]
pub struct TubingArgs {
    /// Channel. Default: all channels.
    pub channel: Option<u8>,
    /// Inner diameter to set, in mm.
    #[arg(long, value_name = "MM", requires = "channel")]
    pub set: Option<f64>,
    /// List the supported inner diameters without connecting.
    #[arg(long, conflicts_with_all = ["channel", "set"])]
    pub supported: bool,
}

#[derive(Args, Debug)]
pub struct MsgArgs {
    /// Text to show (at most 15 characters are displayed).
    pub text: String,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Session config from the config file (if any) with flag overrides applied.
pub fn session_config(device: &DeviceArgs) -> CliResult<SessionConfig> {
    let mut config = match &device.config {
        Some(path) => SessionConfig::load(path).map_err(|err| pump_error("config", err))?,
        None => SessionConfig::default(),
    };
    if let Some(address) = device.address {
        config.pump_address = address;
    }
    if let Some(serial) = &device.serial {
        config.serial_no = Some(serial.clone());
    }
    if let Some(timeout) = &device.command_timeout {
        config.transaction.timeout = parse_duration(timeout)?;
    }
    Ok(config)
}

pub fn open_session(device: &DeviceArgs) -> CliResult<PumpSession<SerialTransport>> {
    let config = session_config(device)?;
    let serial = SerialConfig::default();
    debug!(?device, "opening pump");

    let result = if let Some(port) = &device.port {
        PumpSession::from_serial_portname(port, &serial, config)
    } else if let Some(location) = &device.location {
        PumpSession::from_usb_location(location, &serial, config)
    } else if let Some(serial_no) = config.serial_no.clone() {
        PumpSession::open_by_serial_no(&serial_no, &serial, config)
    } else {
        PumpSession::open_first_device(&serial, config)
    };
    result.map_err(|err| pump_error("connect failed", err))
}

/// Parse `500ms`, `5s`, `2m`; a bare number is seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, scale_ms) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = input.strip_suffix('m') {
        (num, 60_000)
    } else {
        (input, 1_000)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    value
        .checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| CliError::new(USAGE, format!("duration too large: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
        assert_eq!(parse_duration("-1s").unwrap_err().code, USAGE);
    }

    #[test]
    fn flags_override_defaults() {
        let device = DeviceArgs {
            serial: Some("A1B2C3".into()),
            address: Some(2),
            command_timeout: Some("500ms".into()),
            ..DeviceArgs::default()
        };
        let config = session_config(&device).unwrap();
        assert_eq!(config.pump_address, 2);
        assert_eq!(config.serial_no.as_deref(), Some("A1B2C3"));
        assert_eq!(config.transaction.timeout, Duration::from_millis(500));
        assert_eq!(config.transaction.max_retries, 2);
    }

    #[test]
    fn missing_config_file_is_usage_error() {
        let device = DeviceArgs {
            config: Some(PathBuf::from("/nonexistent/reglo.json")),
            ..DeviceArgs::default()
        };
        assert_eq!(session_config(&device).unwrap_err().code, USAGE);
    }
}
