use std::time::Duration;

use crate::core::{DeviceInfo, Platform};
use crate::platform::run_command;

pub fn os_version(timeout: Duration) -> String {
    match powershell(
        "(Get-CimInstance Win32_OperatingSystem).Caption + ' ' + (Get-CimInstance Win32_OperatingSystem).Version",
        timeout,
    ) {
        Some(version) => version,
        None => "unknown".to_string(),
    }
}

pub fn device_info(hostname: &str, timeout: Duration) -> DeviceInfo {
    DeviceInfo {
        display_name: std::env::var("COMPUTERNAME").unwrap_or_else(|_| hostname.to_string()),
        hostname: hostname.to_string(),
        platform: Platform::Windows,
        os_version: os_version(timeout),
        serial_number: powershell("(Get-CimInstance Win32_BIOS).SerialNumber", timeout),
        hardware_model: powershell("(Get-CimInstance Win32_ComputerSystem).Model", timeout),
    }
}

pub(crate) fn powershell(script: &str, timeout: Duration) -> Option<String> {
    let out = run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        timeout,
    )
    .ok()?;
    if out.exit_code != 0 {
        return None;
    }
    let value = out.stdout.trim();
    (!value.is_empty()).then(|| value.to_string())
}
