use reglo_pump::SessionConfig;
use reglo_transport::{Discovery, PortCandidate, SerialConfig, SerialTransport, UsbDiscovery};
use serde::Serialize;

use crate::cmd::{DeviceArgs, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let mut checks = Vec::new();

    match UsbDiscovery::default().candidates() {
        Ok(candidates) => {
            checks.push(CheckResult::new(
                "serial_enumeration",
                CheckStatus::Pass,
                "serial ports enumerated",
            ));
            checks.push(pump_attached_check(&candidates));
            checks.extend(candidates.iter().map(port_access_check));
        }
        Err(err) => checks.push(CheckResult::new(
            "serial_enumeration",
            CheckStatus::Fail,
            err.to_string(),
        )),
    }
    checks.push(config_file_check(device));

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        schema_id: "https://schemas.3leaps.dev/reglo/cli/v1/doctor-report.schema.json",
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn pump_attached_check(candidates: &[PortCandidate]) -> CheckResult {
    if candidates.is_empty() {
        CheckResult::new(
            "pump_attached",
            CheckStatus::Warn,
            "no Reglo ICC found on USB",
        )
    } else {
        let ports = candidates
            .iter()
            .map(|c| c.port_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        CheckResult::new("pump_attached", CheckStatus::Pass, ports)
    }
}

fn port_access_check(candidate: &PortCandidate) -> CheckResult {
    let name = format!("port_access {}", candidate.port_name);
    match SerialTransport::open(&candidate.port_name, &SerialConfig::default()) {
        Ok(_) => CheckResult::new(&name, CheckStatus::Pass, "opened at 9600 8N1"),
        Err(err) if err.io_kind() == Some(std::io::ErrorKind::PermissionDenied) => {
            CheckResult::new(
                &name,
                CheckStatus::Fail,
                format!("{err} (is the user in the dialout group?)"),
            )
        }
        Err(err) => CheckResult::new(&name, CheckStatus::Fail, err.to_string()),
    }
}

fn config_file_check(device: &DeviceArgs) -> CheckResult {
    let Some(path) = &device.config else {
        return CheckResult::new("config_file", CheckStatus::Skip, "no --config given");
    };
    match SessionConfig::load(path) {
        Ok(config) => CheckResult::new(
            "config_file",
            CheckStatus::Pass,
            format!(
                "{} loaded (pump address {})",
                path.display(),
                config.pump_address
            ),
        ),
        Err(err) => CheckResult::new("config_file", CheckStatus::Fail, err.to_string()),
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("reglo doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<28} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Skip => "SKIP",
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn no_pump_is_a_warning_not_a_failure() {
        let check = pump_attached_check(&[]);
        assert!(matches!(check.status, CheckStatus::Warn));
    }

    #[test]
    fn missing_config_file_fails() {
        let device = DeviceArgs {
            config: Some(PathBuf::from("/nonexistent/reglo.json")),
            ..DeviceArgs::default()
        };
        assert!(matches!(
            config_file_check(&device).status,
            CheckStatus::Fail
        ));
        assert!(matches!(
            config_file_check(&DeviceArgs::default()).status,
            CheckStatus::Skip
        ));
    }

    #[test]
    fn doctor_output_has_overall_status() {
        let output = DoctorOutput {
            schema_id: "x",
            checks: vec![CheckResult::new("x", CheckStatus::Pass, "ok")],
            overall: "pass",
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"overall\":\"pass\""));
        assert!(json.contains("\"status\":\"pass\""));
    }
}
