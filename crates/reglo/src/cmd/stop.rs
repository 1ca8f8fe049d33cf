use serde::Serialize;

use crate::cmd::{open_session, DeviceArgs, StopArgs};
use crate::exit::{pump_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct StopOutput {
    schema_id: &'static str,
    stopped: Vec<u8>,
}

pub fn run(args: StopArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = open_session(device)?;
    let stopped = match args.channel {
        Some(channel) => {
            session
                .stop(channel)
                .map_err(|err| pump_error("stop failed", err))?;
            vec![channel]
        }
        None => {
            session
                .stop_all()
                .map_err(|err| pump_error("stop failed", err))?;
            session.channel_nos()
        }
    };

    let out = StopOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/stop.schema.json",
        stopped,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let list = out
                .stopped
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            println!("stopped channel(s) {list}");
        }
        OutputFormat::Raw => {}
    }
    Ok(SUCCESS)
}
