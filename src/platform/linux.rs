use std::path::Path;
use std::time::Duration;

use crate::core::{DeviceInfo, Platform};
use crate::platform::run_command;

pub fn os_version(etc_dir: &Path) -> String {
    let Ok(contents) = std::fs::read_to_string(etc_dir.join("os-release")) else {
        return "unknown".to_string();
    };
    parse_os_release_pretty_name(&contents).unwrap_or_else(|| "unknown".to_string())
}

pub fn device_info(hostname: &str, timeout: Duration) -> DeviceInfo {
    DeviceInfo {
        display_name: pretty_hostname(timeout).unwrap_or_else(|| hostname.to_string()),
        hostname: hostname.to_string(),
        platform: Platform::Linux,
        os_version: os_version(Path::new("/etc")),
        serial_number: dmi_field("/sys/class/dmi/id/product_serial"),
        hardware_model: dmi_field("/sys/class/dmi/id/product_name"),
    }
}

fn pretty_hostname(timeout: Duration) -> Option<String> {
    let out = run_command("hostnamectl", &["--pretty"], timeout).ok()?;
    if out.exit_code != 0 {
        return None;
    }
    let name = out.stdout.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn dmi_field(path: &str) -> Option<String> {
    let value = std::fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() || value == "None" {
        return None;
    }
    Some(value.to_string())
}

pub(crate) fn parse_os_release_pretty_name(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let Some(value) = line.strip_prefix("PRETTY_NAME=") else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}
