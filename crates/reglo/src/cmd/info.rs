use reglo_pump::{DeviceIdentity, PumpSession};
use reglo_transport::Transport;
use serde::Serialize;

use crate::cmd::{open_session, DeviceArgs, InfoArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, round, table, OutputFormat};

#[derive(Serialize)]
struct ChannelInfo {
    channel: u8,
    inner_diameter_mm: f64,
    ml_per_rev: f64,
    min_rate_ml_per_min: f64,
    max_rate_ml_per_min: f64,
    dispense_dir: String,
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    schema_id: &'static str,
    pump_address: u8,
    #[serde(flatten)]
    identity: &'a DeviceIdentity,
    channels: Vec<ChannelInfo>,
}

pub fn run(_args: InfoArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let channels = channel_info(&session);
    let out = InfoOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/pump-info.schema.json",
        pump_address: session.pump_address(),
        identity: session.identity(),
        channels,
    };
    print_info(&out, format);
    Ok(SUCCESS)
}

fn channel_info<T: Transport>(session: &PumpSession<T>) -> Vec<ChannelInfo> {
    let limits = &session.config().limits;
    session
        .channel_nos()
        .into_iter()
        .filter_map(|ch| {
            let cal = session.calibration(ch)?;
            let range = cal.flow_rate_range(limits);
            Some(ChannelInfo {
                channel: ch,
                inner_diameter_mm: cal.inner_diameter_mm,
                ml_per_rev: round(cal.ml_per_rev, 5),
                min_rate_ml_per_min: round(*range.start(), 5),
                max_rate_ml_per_min: round(*range.end(), 3),
                dispense_dir: session
                    .dispense_dir(ch)
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn print_info(out: &InfoOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Pump Info:");
            println!("  Model:        {}", out.identity.model_no);
            println!("  Serial:       {}", out.identity.serial_no);
            println!("  Software:     {}", out.identity.sw_ver);
            println!("  Head code:    {}", out.identity.head_code);
            println!("  Address:      {}", out.pump_address);
            let mut t = table(["CHANNEL", "TUBING ID (mm)", "mL/rev", "NOMINAL FLOW (mL/min)", "DISPENSE"]);
            for c in &out.channels {
                t.add_row(vec![
                    c.channel.to_string(),
                    format!("{:.2}", c.inner_diameter_mm),
                    c.ml_per_rev.to_string(),
                    format!("{} - {}", c.min_rate_ml_per_min, c.max_rate_ml_per_min),
                    c.dispense_dir.clone(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Raw => {
            println!("{}", out.identity.serial_no);
        }
    }
}
