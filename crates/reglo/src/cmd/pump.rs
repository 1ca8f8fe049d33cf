use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reglo_pump::{run_time, signed_volume, PumpDirection, PumpSession};
use reglo_transport::Transport;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{open_session, parse_duration, DeviceArgs, PumpArgs, VolumeArgs};
use crate::exit::{pump_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::{print_json, round, OutputFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Started,
    Completed,
    Interrupted,
}

#[derive(Serialize)]
struct PumpOutput {
    schema_id: &'static str,
    channel: u8,
    direction: PumpDirection,
    volume_ml: f64,
    signed_volume_ml: f64,
    rate_ml_per_min: f64,
    expected_seconds: Option<f64>,
    outcome: Outcome,
}

pub fn run_pump(args: PumpArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let direction = args.direction;
    execute(&session, args.volume, direction, format)
}

pub fn run_dispense(args: VolumeArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let direction = session
        .dispense_dir(args.channel)
        .map_err(|err| pump_error("dispense failed", err))?;
    execute(&session, args, direction, format)
}

pub fn run_aspirate(args: VolumeArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let direction = session
        .dispense_dir(args.channel)
        .map_err(|err| pump_error("aspirate failed", err))?
        .opposite();
    execute(&session, args, direction, format)
}

fn execute<T: Transport>(
    session: &PumpSession<T>,
    args: VolumeArgs,
    direction: PumpDirection,
    format: OutputFormat,
) -> CliResult<i32> {
    let requested = args.wait_timeout.as_deref().map(parse_duration).transpose()?;
    let expected = run_time(args.volume, args.rate);
    let wait_timeout = wait_bound(requested, expected, session.config().wait_timeout);

    session
        .pump_vol(args.channel, direction, args.volume, args.rate)
        .map_err(|err| pump_error("pump failed", err))?;

    let mut out = PumpOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/pump-run.schema.json",
        channel: args.channel,
        direction,
        volume_ml: args.volume,
        signed_volume_ml: signed_volume(direction, args.volume),
        rate_ml_per_min: args.rate,
        expected_seconds: expected.map(|d| round(d.as_secs_f64(), 1)),
        outcome: Outcome::Started,
    };

    if !args.wait {
        print_pump(&out, format);
        return Ok(SUCCESS);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(cancel.clone())?;

    debug!(channel = args.channel, ?wait_timeout, "waiting for channel to stop");
    let waited = session.wait_for_stop_cancellable(
        &[args.channel],
        session.config().poll_interval,
        wait_timeout,
        &cancel,
    );
    match waited {
        Ok(true) => {
            info!(channel = args.channel, "pumping completed");
            out.outcome = Outcome::Completed;
            print_pump(&out, format);
            Ok(SUCCESS)
        }
        Ok(false) => {
            warn!(channel = args.channel, "interrupted, stopping channel");
            session
                .stop(args.channel)
                .map_err(|err| pump_error("stop failed", err))?;
            out.outcome = Outcome::Interrupted;
            print_pump(&out, format);
            Ok(INTERRUPTED)
        }
        Err(err) => {
            if let Err(stop_err) = session.stop(args.channel) {
                warn!(channel = args.channel, error = %stop_err, "failed to stop channel");
            }
            Err(pump_error("wait failed", err))
        }
    }
}

/// Headroom over the expected run time before a wait gives up.
const WAIT_MARGIN: Duration = Duration::from_secs(30);

/// An explicit `--wait-timeout` wins. Otherwise wait at least the configured
/// bound, and longer when the run itself is expected to take longer.
fn wait_bound(
    requested: Option<Duration>,
    expected: Option<Duration>,
    configured: Duration,
) -> Duration {
    if let Some(requested) = requested {
        return requested;
    }
    let Some(expected) = expected else {
        return configured;
    };
    let padded = expected
        .checked_add(expected / 10)
        .and_then(|d| d.checked_add(WAIT_MARGIN))
        .unwrap_or(Duration::MAX);
    padded.max(configured)
}

fn install_ctrlc_handler(cancel: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn print_pump(out: &PumpOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let eta = out
                .expected_seconds
                .map(|s| format!(", ~{s}s"))
                .unwrap_or_default();
            println!(
                "channel {}: {} mL {} at {} mL/min{} ({})",
                out.channel,
                out.volume_ml,
                out.direction,
                out.rate_ml_per_min,
                eta,
                outcome_text(out.outcome)
            );
        }
        OutputFormat::Raw => println!("{}", outcome_text(out.outcome)),
    }
}

fn outcome_text(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Started => "started",
        Outcome::Completed => "completed",
        Outcome::Interrupted => "interrupted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_bound_covers_long_runs() {
        let configured = Duration::from_secs(300);
        // 100 mL at 1 mL/min
        let expected = run_time(100.0, 1.0);
        assert_eq!(
            wait_bound(None, expected, configured),
            Duration::from_secs(6000 + 600 + 30)
        );
    }

    #[test]
    fn wait_bound_keeps_configured_floor() {
        let configured = Duration::from_secs(300);
        assert_eq!(wait_bound(None, run_time(1.0, 10.0), configured), configured);
        assert_eq!(wait_bound(None, None, configured), configured);
    }

    #[test]
    fn explicit_wait_timeout_wins() {
        let requested = Some(Duration::from_secs(5));
        assert_eq!(
            wait_bound(requested, run_time(100.0, 1.0), Duration::from_secs(300)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn wait_bound_saturates() {
        let huge = Some(Duration::MAX - Duration::from_secs(1));
        assert_eq!(wait_bound(None, huge, Duration::from_secs(300)), Duration::MAX);
    }

    #[test]
    fn output_serializes_direction_and_outcome() {
        let out = PumpOutput {
            schema_id: "x",
            channel: 2,
            direction: PumpDirection::CounterClockwise,
            volume_ml: 1.5,
            signed_volume_ml: -1.5,
            rate_ml_per_min: 3.0,
            expected_seconds: Some(30.0),
            outcome: Outcome::Completed,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"direction\":\"ccw\""));
        assert!(json.contains("\"outcome\":\"completed\""));
        assert!(json.contains("\"signed_volume_ml\":-1.5"));
    }
}
