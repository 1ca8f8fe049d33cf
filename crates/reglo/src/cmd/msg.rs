use crate::cmd::{open_session, DeviceArgs, MsgArgs};
use crate::exit::{pump_error, CliResult, SUCCESS};

pub fn run(args: MsgArgs, device: &DeviceArgs) -> CliResult<i32> {
    let session = open_session(device)?;
    session
        .show_msg(&args.text)
        .map_err(|err| pump_error("display failed", err))?;
    Ok(SUCCESS)
}
