use reglo_transport::{Discovery, PortCandidate, UsbDiscovery, REGLO_ICC_USB_ID};
use serde::Serialize;

use crate::cmd::ListArgs;
use crate::exit::{transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct PortOutput<'a> {
    port: &'a str,
    location: Option<&'a str>,
    usb_id: String,
    usb_serial: Option<&'a str>,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    schema_id: &'static str,
    ports: Vec<PortOutput<'a>>,
}

pub fn run(args: ListArgs, format: OutputFormat) -> CliResult<i32> {
    let mut usb_ids = vec![REGLO_ICC_USB_ID];
    for id in &args.usb_ids {
        usb_ids.push(parse_usb_id(id)?);
    }
    let candidates = UsbDiscovery::with_usb_ids(usb_ids)
        .candidates()
        .map_err(|err| transport_error("port enumeration failed", err))?;

    let out = ListOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/port-list.schema.json",
        ports: candidates.iter().map(port_output).collect(),
    };
    print_list(&out, format);
    Ok(SUCCESS)
}

fn port_output(candidate: &PortCandidate) -> PortOutput<'_> {
    PortOutput {
        port: &candidate.port_name,
        location: candidate.location.as_deref(),
        usb_id: format!("{:04x}:{:04x}", candidate.vid, candidate.pid),
        usb_serial: candidate.usb_serial.as_deref(),
    }
}

fn print_list(out: &ListOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut t = table(["PORT", "LOCATION", "USB ID", "USB SERIAL"]);
            for p in &out.ports {
                t.add_row(vec![
                    p.port.to_string(),
                    p.location.unwrap_or("-").to_string(),
                    p.usb_id.clone(),
                    p.usb_serial.unwrap_or("-").to_string(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            if out.ports.is_empty() {
                println!("No pumps found.");
            }
            for p in &out.ports {
                println!(
                    "{} (location {}, usb {})",
                    p.port,
                    p.location.unwrap_or("unknown"),
                    p.usb_id
                );
            }
        }
        OutputFormat::Raw => {
            for p in &out.ports {
                println!("{}", p.port);
            }
        }
    }
}

fn parse_usb_id(input: &str) -> CliResult<(u16, u16)> {
    let invalid = || CliError::new(USAGE, format!("invalid USB id (expected VID:PID): {input}"));
    let (vid, pid) = input.split_once(':').ok_or_else(invalid)?;
    let vid = u16::from_str_radix(vid.trim(), 16).map_err(|_| invalid())?;
    let pid = u16::from_str_radix(pid.trim(), 16).map_err(|_| invalid())?;
    Ok((vid, pid))
}
