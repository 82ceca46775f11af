use std::time::Duration;

use crate::core::{DeviceInfo, Platform};
use crate::platform::run_command;

pub fn os_version(timeout: Duration) -> String {
    match run_command("sw_vers", &["-productVersion"], timeout) {
        Ok(out) if out.exit_code == 0 && !out.stdout.trim().is_empty() => {
            out.stdout.trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}

pub fn device_info(hostname: &str, timeout: Duration) -> DeviceInfo {
    DeviceInfo {
        display_name: computer_name(timeout).unwrap_or_else(|| hostname.to_string()),
        hostname: hostname.to_string(),
        platform: Platform::Macos,
        os_version: os_version(timeout),
        serial_number: serial_number(timeout),
        hardware_model: hardware_model(timeout),
    }
}

fn computer_name(timeout: Duration) -> Option<String> {
    let out = run_command("scutil", &["--get", "ComputerName"], timeout).ok()?;
    if out.exit_code != 0 {
        return None;
    }
    let name = out.stdout.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn serial_number(timeout: Duration) -> Option<String> {
    let out = run_command(
        "ioreg",
        &["-rd1", "-c", "IOPlatformExpertDevice"],
        timeout,
    )
    .ok()?;
    if out.exit_code != 0 {
        return None;
    }
    parse_ioreg_serial(&out.stdout)
}

fn hardware_model(timeout: Duration) -> Option<String> {
    let out = run_command("sysctl", &["-n", "hw.model"], timeout).ok()?;
    if out.exit_code != 0 {
        return None;
    }
    let model = out.stdout.trim();
    (!model.is_empty()).then(|| model.to_string())
}

pub(crate) fn parse_ioreg_serial(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        if !line.contains("IOPlatformSerialNumber") {
            continue;
        }
        let value = line.rsplit('=').next()?.trim().trim_matches('"');
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}
