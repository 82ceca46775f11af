use anyhow::Result;

use crate::checks::{
    CheckContext, CheckProvider, Probe, ProbeOutcome, password_verdict, screen_lock_verdict,
};
use crate::core::CheckType;
use crate::platform::{run_command, run_command_invoking_user};

pub static PROVIDERS: &[CheckProvider] = &[
    CheckProvider {
        check_type: CheckType::DiskEncryption,
        probes: &[
            Probe {
                method: "fdesetup",
                run: disk_encryption_fdesetup,
            },
            Probe {
                method: "diskutil",
                run: disk_encryption_diskutil,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::Antivirus,
        probes: &[
            Probe {
                method: "xprotect",
                run: antivirus_xprotect,
            },
            Probe {
                method: "av_apps",
                run: antivirus_applications,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::PasswordPolicy,
        probes: &[
            Probe {
                method: "pwpolicy_account",
                run: password_policy_account_policies,
            },
            Probe {
                method: "pwpolicy_global",
                run: password_policy_global_policy,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::ScreenLock,
        probes: &[
            Probe {
                method: "sysadminctl",
                run: screen_lock_sysadminctl,
            },
            Probe {
                method: "defaults",
                run: screen_lock_defaults,
            },
        ],
    },
];

const XPROTECT_BUNDLES: &[&str] = &[
    "/Library/Apple/System/Library/CoreServices/XProtect.bundle",
    "/System/Library/CoreServices/XProtect.bundle",
];

const AV_APP_NAMES: &[&str] = &[
    "Sophos",
    "Malwarebytes",
    "CrowdStrike",
    "SentinelOne",
    "ESET",
    "Avast",
];

fn disk_encryption_fdesetup(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("fdesetup", &["status"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    match parse_fdesetup_status(&raw) {
        Some(true) => Ok(Some(ProbeOutcome::pass(raw, "FileVault が有効です"))),
        Some(false) => Ok(Some(ProbeOutcome::fail(raw, "FileVault が無効です"))),
        None => Ok(None),
    }
}

fn disk_encryption_diskutil(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("diskutil", &["info", "/"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    match parse_diskutil_filevault(&raw) {
        Some(true) => Ok(Some(ProbeOutcome::pass(
            raw,
            "システムボリュームは暗号化されています",
        ))),
        Some(false) => Ok(Some(ProbeOutcome::fail(
            raw,
            "システムボリュームが暗号化されていません",
        ))),
        None => Ok(None),
    }
}

fn antivirus_xprotect(_ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    for bundle in XPROTECT_BUNDLES {
        if std::path::Path::new(bundle).exists() {
            return Ok(Some(ProbeOutcome::pass(
                (*bundle).to_string(),
                "XProtect（macOS 内蔵のマルウェア対策）が存在します",
            )));
        }
    }
    Ok(None)
}

fn antivirus_applications(_ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let apps = std::path::Path::new("/Applications");
    let Ok(entries) = std::fs::read_dir(apps) else {
        return Ok(None);
    };
    let mut names = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if AV_APP_NAMES.iter().any(|known| name.contains(known)) {
            return Ok(Some(ProbeOutcome::pass(
                name.clone(),
                format!("ウイルス対策アプリを検出しました: {name}"),
            )));
        }
        names.push(name);
    }
    Ok(Some(ProbeOutcome::fail(
        names.join("\n"),
        "ウイルス対策ソフトが見つかりませんでした",
    )))
}

fn password_policy_account_policies(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("pwpolicy", &["-getaccountpolicies"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    let Some(minlen) = parse_account_policies_min_length(&raw) else {
        return Ok(None);
    };
    Ok(Some(password_verdict(minlen, raw)))
}

fn password_policy_global_policy(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command(
        "pwpolicy",
        &["-n", "/Local/Default", "-getglobalpolicy"],
        ctx.timeout,
    )?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    match parse_global_policy_min_chars(&raw) {
        Some(minlen) => Ok(Some(password_verdict(minlen, raw))),
        None => Ok(Some(ProbeOutcome::fail(
            raw,
            "最小パスワード長ポリシーが設定されていません",
        ))),
    }
}

fn screen_lock_sysadminctl(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("sysadminctl", &["-screenLock", "status"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    // sysadminctl reports on stderr
    let status_text = format!("{}\n{}", out.stdout.trim(), out.stderr.trim());
    let Some(password_required) = parse_sysadminctl_screen_lock(&status_text) else {
        return Ok(None);
    };
    let Some(idle_secs) = read_idle_time(ctx) else {
        return Ok(None);
    };
    let raw = format!("{} idleTime={idle_secs}", status_text.trim());
    Ok(Some(screen_lock_verdict(idle_secs, password_required, raw)))
}

fn screen_lock_defaults(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    // sudo 経由でもユーザー自身の設定を見る
    let ask = run_command_invoking_user(
        "defaults",
        &["read", "com.apple.screensaver", "askForPassword"],
        ctx.timeout,
    )?;
    if ask.exit_code != 0 {
        return Ok(None);
    }
    let password_required = ask.stdout.trim() == "1";
    let Some(idle_secs) = read_idle_time(ctx) else {
        return Ok(None);
    };
    let raw = format!(
        "askForPassword={} idleTime={idle_secs}",
        ask.stdout.trim()
    );
    Ok(Some(screen_lock_verdict(idle_secs, password_required, raw)))
}

fn read_idle_time(ctx: &CheckContext) -> Option<u32> {
    let out = run_command_invoking_user(
        "defaults",
        &["-currentHost", "read", "com.apple.screensaver", "idleTime"],
        ctx.timeout,
    )
    .ok()?;
    if out.exit_code != 0 {
        return None;
    }
    out.stdout.trim().parse::<u32>().ok()
}

pub(crate) fn parse_fdesetup_status(stdout: &str) -> Option<bool> {
    if stdout.contains("FileVault is On") {
        Some(true)
    } else if stdout.contains("FileVault is Off") {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_diskutil_filevault(stdout: &str) -> Option<bool> {
    for line in stdout.lines() {
        let line = line.trim();
        for key in ["FileVault:", "Encrypted:"] {
            let Some(value) = line.strip_prefix(key) else {
                continue;
            };
            match value.trim() {
                "Yes" => return Some(true),
                "No" => return Some(false),
                _ => {}
            }
        }
    }
    None
}

pub(crate) fn parse_account_policies_min_length(stdout: &str) -> Option<u32> {
    let idx = stdout.find("policyAttributeMinimumLength")?;
    let rest = &stdout[idx..];
    let start = rest.find("<integer>")?;
    let rest = &rest[start + "<integer>".len()..];
    let end = rest.find("</integer>")?;
    rest[..end].trim().parse::<u32>().ok()
}

pub(crate) fn parse_global_policy_min_chars(stdout: &str) -> Option<u32> {
    for token in stdout.split_whitespace() {
        if let Some(value) = token.strip_prefix("minChars=") {
            return value.parse::<u32>().ok();
        }
    }
    None
}

pub(crate) fn parse_sysadminctl_screen_lock(text: &str) -> Option<bool> {
    if text.contains("screenLock is off") {
        Some(false)
    } else if text.contains("screenLock delay is") || text.contains("screenLock is immediate") {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fdesetup_status_parses_both_states() {
        assert_eq!(parse_fdesetup_status("FileVault is On."), Some(true));
        assert_eq!(parse_fdesetup_status("FileVault is Off."), Some(false));
        assert_eq!(parse_fdesetup_status("Deferred enablement"), None);
    }

    #[test]
    fn diskutil_filevault_field_parses() {
        let stdout = "   Volume Name:  Macintosh HD\n   FileVault:    Yes\n";
        assert_eq!(parse_diskutil_filevault(stdout), Some(true));
        let stdout = "   Encrypted:    No\n";
        assert_eq!(parse_diskutil_filevault(stdout), Some(false));
        assert_eq!(parse_diskutil_filevault("Volume Name: X\n"), None);
    }

    #[test]
    fn account_policies_minimum_length_parses_plist_integer() {
        let stdout = r#"<key>policyIdentifier</key>
<string>policyAttributeMinimumLength</string>
<key>policyParameters</key>
<dict><key>minimumLength</key><integer>10</integer></dict>"#;
        assert_eq!(parse_account_policies_min_length(stdout), Some(10));
        assert_eq!(parse_account_policies_min_length("<dict></dict>"), None);
    }

    #[test]
    fn global_policy_min_chars_parses() {
        assert_eq!(
            parse_global_policy_min_chars("usingHistory=0 minChars=8 maxFailedLoginAttempts=0"),
            Some(8)
        );
        assert_eq!(parse_global_policy_min_chars("usingHistory=0"), None);
    }

    #[test]
    fn sysadminctl_screen_lock_states() {
        assert_eq!(
            parse_sysadminctl_screen_lock("screenLock delay is 300 seconds"),
            Some(true)
        );
        assert_eq!(
            parse_sysadminctl_screen_lock("screenLock is immediate"),
            Some(true)
        );
        assert_eq!(parse_sysadminctl_screen_lock("screenLock is off"), Some(false));
        assert_eq!(parse_sysadminctl_screen_lock("unexpected"), None);
    }
}
