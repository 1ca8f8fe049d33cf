use reglo_pump::{ChannelCalibration, PumpLimits, SUPPORTED_TUBING_IDS_MM};
use serde::Serialize;

use crate::cmd::{open_session, session_config, DeviceArgs, TubingArgs};
use crate::exit::{pump_error, CliResult, SUCCESS};
use crate::output::{print_json, round, table, OutputFormat};

#[derive(Serialize)]
struct TubingRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<u8>,
    inner_diameter_mm: f64,
    ml_per_rev: f64,
    min_rate_ml_per_min: f64,
    max_rate_ml_per_min: f64,
}

#[derive(Serialize)]
struct TubingOutput {
    schema_id: &'static str,
    tubing: Vec<TubingRow>,
}

pub fn run(args: TubingArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    if args.supported {
        let limits = session_config(device)?.limits;
        let rows = SUPPORTED_TUBING_IDS_MM
            .iter()
            .map(|&mm| row(None, &ChannelCalibration::new(0, mm, &limits), &limits))
            .collect();
        let out = TubingOutput {
            schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/tubing-supported.schema.json",
            tubing: rows,
        };
        print_tubing(&out, format);
        return Ok(SUCCESS);
    }

    let session = open_session(device)?;
    if let (Some(channel), Some(mm)) = (args.channel, args.set) {
        session
            .set_tubing_id(channel, mm)
            .map_err(|err| pump_error("set tubing failed", err))?;
    }

    let limits = &session.config().limits;
    let channels = match args.channel {
        Some(channel) => vec![channel],
        None => session.channel_nos(),
    };
    let mut rows = Vec::with_capacity(channels.len());
    for channel in channels {
        let calibration = session.calibration(channel).ok_or_else(|| {
            pump_error(
                "tubing",
                reglo_pump::PumpError::InvalidChannel {
                    channel,
                    channels: session.channel_nos(),
                },
            )
        })?;
        rows.push(row(Some(channel), &calibration, limits));
    }

    let out = TubingOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/tubing.schema.json",
        tubing: rows,
    };
    print_tubing(&out, format);
    Ok(SUCCESS)
}

fn row(channel: Option<u8>, calibration: &ChannelCalibration, limits: &PumpLimits) -> TubingRow {
    let range = calibration.flow_rate_range(limits);
    TubingRow {
        channel,
        inner_diameter_mm: calibration.inner_diameter_mm,
        ml_per_rev: round(calibration.ml_per_rev, 5),
        min_rate_ml_per_min: round(*range.start(), 5),
        max_rate_ml_per_min: round(*range.end(), 3),
    }
}

fn print_tubing(out: &TubingOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut t = table(["CHANNEL", "TUBING ID (mm)", "mL/rev", "NOMINAL FLOW (mL/min)"]);
            for r in &out.tubing {
                t.add_row(vec![
                    r.channel.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                    format!("{:.2}", r.inner_diameter_mm),
                    r.ml_per_rev.to_string(),
                    format!("{} - {}", r.min_rate_ml_per_min, r.max_rate_ml_per_min),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Raw => {
            for r in &out.tubing {
                println!("{:.2}", r.inner_diameter_mm);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_row_uses_calibration_model() {
        let limits = PumpLimits::default();
        let r = row(None, &ChannelCalibration::new(0, 1.52, &limits), &limits);
        assert_eq!(r.ml_per_rev, 0.0804);
        assert_eq!(r.max_rate_ml_per_min, 8.04);
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("channel"));
    }
}
