use anyhow::Result;

use crate::checks::{
    CheckContext, CheckProvider, Probe, ProbeOutcome, password_verdict, screen_lock_verdict,
};
use crate::core::CheckType;
use crate::platform::run_command;

pub static PROVIDERS: &[CheckProvider] = &[
    CheckProvider {
        check_type: CheckType::DiskEncryption,
        probes: &[
            Probe {
                method: "manage_bde",
                run: disk_encryption_manage_bde,
            },
            Probe {
                method: "powershell_bitlocker",
                run: disk_encryption_powershell,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::Antivirus,
        probes: &[
            Probe {
                method: "defender_status",
                run: antivirus_defender,
            },
            Probe {
                method: "security_center",
                run: antivirus_security_center,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::PasswordPolicy,
        probes: &[
            Probe {
                method: "net_accounts",
                run: password_policy_net_accounts,
            },
            Probe {
                method: "secedit",
                run: password_policy_secedit,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::ScreenLock,
        probes: &[
            Probe {
                method: "registry",
                run: screen_lock_registry,
            },
            Probe {
                method: "powershell_registry",
                run: screen_lock_powershell,
            },
        ],
    },
];

fn powershell(ctx: &CheckContext, script: &str) -> Result<Option<String>> {
    let out = run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        ctx.timeout,
    )?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    Ok(Some(out.stdout))
}

fn disk_encryption_manage_bde(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("manage-bde", &["-status", "C:"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    match parse_manage_bde_protection(&raw) {
        Some(true) => Ok(Some(ProbeOutcome::pass(raw, "BitLocker が有効です"))),
        Some(false) => Ok(Some(ProbeOutcome::fail(raw, "BitLocker が無効です"))),
        None => Ok(None),
    }
}

fn disk_encryption_powershell(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let Some(stdout) = powershell(
        ctx,
        "(Get-BitLockerVolume -MountPoint C:).ProtectionStatus",
    )?
    else {
        return Ok(None);
    };
    let raw = stdout.trim().to_string();
    match raw.as_str() {
        "On" | "1" => Ok(Some(ProbeOutcome::pass(raw, "BitLocker が有効です"))),
        "Off" | "0" => Ok(Some(ProbeOutcome::fail(raw, "BitLocker が無効です"))),
        _ => Ok(None),
    }
}

fn antivirus_defender(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let Some(stdout) = powershell(ctx, "(Get-MpComputerStatus).AntivirusEnabled")? else {
        return Ok(None);
    };
    let raw = stdout.trim().to_string();
    match raw.as_str() {
        "True" => Ok(Some(ProbeOutcome::pass(
            raw,
            "Microsoft Defender が有効です",
        ))),
        "False" => Ok(Some(ProbeOutcome::fail(
            raw,
            "Microsoft Defender が無効です",
        ))),
        _ => Ok(None),
    }
}

fn antivirus_security_center(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let Some(stdout) = powershell(
        ctx,
        "Get-CimInstance -Namespace root/SecurityCenter2 -ClassName AntiVirusProduct | Select-Object -ExpandProperty displayName",
    )?
    else {
        return Ok(None);
    };
    let raw = stdout.trim().to_string();
    if raw.is_empty() {
        return Ok(Some(ProbeOutcome::fail(
            raw,
            "ウイルス対策製品が登録されていません",
        )));
    }
    let first = raw.lines().next().unwrap_or("").trim().to_string();
    Ok(Some(ProbeOutcome::pass(
        raw.clone(),
        format!("ウイルス対策製品を検出しました: {first}"),
    )))
}

fn password_policy_net_accounts(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("net", &["accounts"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    let Some(minlen) = parse_net_accounts_min_length(&raw) else {
        return Ok(None);
    };
    Ok(Some(password_verdict(minlen, raw)))
}

fn password_policy_secedit(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let export = std::env::temp_dir().join(format!("complyd-secpol-{}.cfg", std::process::id()));
    let export_s = export.display().to_string();
    let out = run_command(
        "secedit",
        &["/export", "/cfg", export_s.as_str(), "/areas", "SECURITYPOLICY"],
        ctx.timeout,
    );
    let result = match out {
        Ok(out) if out.exit_code == 0 => {
            let contents = std::fs::read_to_string(&export).unwrap_or_default();
            parse_secedit_min_password_length(&contents)
                .map(|minlen| password_verdict(minlen, format!("MinimumPasswordLength = {minlen}")))
        }
        _ => None,
    };
    let _ = std::fs::remove_file(&export);
    Ok(result)
}

fn screen_lock_registry(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let query = |value: &str| -> Result<Option<String>> {
        let out = run_command(
            "reg",
            &["query", r"HKCU\Control Panel\Desktop", "/v", value],
            ctx.timeout,
        )?;
        if out.exit_code != 0 {
            return Ok(None);
        }
        Ok(parse_reg_value(&out.stdout, value))
    };

    let Some(timeout_s) = query("ScreenSaveTimeOut")? else {
        return Ok(None);
    };
    let active = query("ScreenSaveActive")?.unwrap_or_else(|| "0".to_string());
    let secure = query("ScreenSaverIsSecure")?.unwrap_or_else(|| "0".to_string());

    let Ok(idle_secs) = timeout_s.parse::<u32>() else {
        return Ok(None);
    };
    let password_required = active == "1" && secure == "1";
    let raw = format!(
        "ScreenSaveTimeOut={timeout_s} ScreenSaveActive={active} ScreenSaverIsSecure={secure}"
    );
    Ok(Some(screen_lock_verdict(idle_secs, password_required, raw)))
}

fn screen_lock_powershell(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let Some(stdout) = powershell(
        ctx,
        "Get-ItemProperty 'HKCU:\\Control Panel\\Desktop' | Select-Object ScreenSaveTimeOut,ScreenSaveActive,ScreenSaverIsSecure | Format-List",
    )?
    else {
        return Ok(None);
    };
    let Some(timeout_s) = parse_format_list_value(&stdout, "ScreenSaveTimeOut") else {
        return Ok(None);
    };
    let Ok(idle_secs) = timeout_s.parse::<u32>() else {
        return Ok(None);
    };
    let active = parse_format_list_value(&stdout, "ScreenSaveActive").unwrap_or_default();
    let secure = parse_format_list_value(&stdout, "ScreenSaverIsSecure").unwrap_or_default();
    let password_required = active == "1" && secure == "1";
    Ok(Some(screen_lock_verdict(
        idle_secs,
        password_required,
        stdout.trim().to_string(),
    )))
}

pub(crate) fn parse_manage_bde_protection(stdout: &str) -> Option<bool> {
    for line in stdout.lines() {
        if !line.contains("Protection Status") {
            continue;
        }
        if line.contains("Protection On") {
            return Some(true);
        }
        if line.contains("Protection Off") {
            return Some(false);
        }
    }
    None
}

pub(crate) fn parse_net_accounts_min_length(stdout: &str) -> Option<u32> {
    for line in stdout.lines() {
        if !line.contains("Minimum password length") {
            continue;
        }
        let value = line.rsplit(':').next()?.trim();
        if value.eq_ignore_ascii_case("none") {
            return Some(0);
        }
        return value.parse::<u32>().ok();
    }
    None
}

pub(crate) fn parse_secedit_min_password_length(contents: &str) -> Option<u32> {
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == "MinimumPasswordLength" {
            return value.trim().parse::<u32>().ok();
        }
    }
    None
}

pub(crate) fn parse_reg_value(stdout: &str, name: &str) -> Option<String> {
    for line in stdout.lines() {
        let mut cols = line.split_whitespace();
        if cols.next() != Some(name) {
            continue;
        }
        let _reg_type = cols.next()?;
        return cols.next().map(|s| s.to_string());
    }
    None
}

pub(crate) fn parse_format_list_value(stdout: &str, name: &str) -> Option<String> {
    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() == name {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manage_bde_protection_status_parses() {
        let stdout = "Volume C: [OS]\n    Protection Status:    Protection On\n";
        assert_eq!(parse_manage_bde_protection(stdout), Some(true));
        let stdout = "    Protection Status:    Protection Off (1 reboots left)\n";
        assert_eq!(parse_manage_bde_protection(stdout), Some(false));
        assert_eq!(parse_manage_bde_protection("Volume C:\n"), None);
    }

    #[test]
    fn net_accounts_minimum_length_parses_by_label() {
        let stdout = "Force user logoff how long after time expires?:       Never\nMinimum password length:                              6\n";
        assert_eq!(parse_net_accounts_min_length(stdout), Some(6));
        let stdout = "Minimum password length:                              None\n";
        assert_eq!(parse_net_accounts_min_length(stdout), Some(0));
        assert_eq!(parse_net_accounts_min_length("Lockout threshold: 3\n"), None);
    }

    #[test]
    fn secedit_minimum_password_length_parses() {
        let contents = "[System Access]\nMinimumPasswordAge = 0\nMinimumPasswordLength = 7\n";
        assert_eq!(parse_secedit_min_password_length(contents), Some(7));
        assert_eq!(parse_secedit_min_password_length("[System Access]\n"), None);
    }

    #[test]
    fn reg_query_value_parses() {
        let stdout = "\r\nHKEY_CURRENT_USER\\Control Panel\\Desktop\r\n    ScreenSaveTimeOut    REG_SZ    600\r\n";
        assert_eq!(
            parse_reg_value(stdout, "ScreenSaveTimeOut").as_deref(),
            Some("600")
        );
        assert_eq!(parse_reg_value(stdout, "ScreenSaveActive"), None);
    }

    #[test]
    fn format_list_values_parse() {
        let stdout = "ScreenSaveTimeOut   : 300\nScreenSaveActive    : 1\nScreenSaverIsSecure : 1\n";
        assert_eq!(
            parse_format_list_value(stdout, "ScreenSaveTimeOut").as_deref(),
            Some("300")
        );
        assert_eq!(
            parse_format_list_value(stdout, "ScreenSaverIsSecure").as_deref(),
            Some("1")
        );
    }
}
