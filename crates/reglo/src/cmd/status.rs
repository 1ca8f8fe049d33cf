use serde::Serialize;

use crate::cmd::{open_session, DeviceArgs, StatusArgs};
use crate::exit::{pump_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct ChannelStatus {
    channel: u8,
    running: bool,
}

#[derive(Serialize)]
struct StatusOutput {
    schema_id: &'static str,
    serial_no: String,
    channels: Vec<ChannelStatus>,
}

pub fn run(args: StatusArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let channels = match args.channel {
        Some(channel) => vec![channel],
        None => session.channel_nos(),
    };

    let mut statuses = Vec::with_capacity(channels.len());
    for channel in channels {
        let running = session
            .is_running(channel)
            .map_err(|err| pump_error("status failed", err))?;
        statuses.push(ChannelStatus { channel, running });
    }

    let out = StatusOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/channel-status.schema.json",
        serial_no: session.serial_no().to_string(),
        channels: statuses,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut t = table(["CHANNEL", "RUNNING"]);
            for c in &out.channels {
                t.add_row(vec![c.channel.to_string(), yes_no(c.running).to_string()]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for c in &out.channels {
                println!(
                    "channel {}: {}",
                    c.channel,
                    if c.running { "running" } else { "stopped" }
                );
            }
        }
        OutputFormat::Raw => {
            for c in &out.channels {
                println!("{} {}", c.channel, u8::from(c.running));
            }
        }
    }
    Ok(SUCCESS)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
