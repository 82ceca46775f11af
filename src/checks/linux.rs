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
                method: "lsblk",
                run: disk_encryption_lsblk,
            },
            Probe {
                method: "dmsetup",
                run: disk_encryption_dmsetup,
            },
            Probe {
                method: "crypttab",
                run: disk_encryption_crypttab,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::Antivirus,
        probes: &[
            Probe {
                method: "systemd_units",
                run: antivirus_systemd_units,
            },
            Probe {
                method: "known_binaries",
                run: antivirus_known_binaries,
            },
            Probe {
                method: "processes",
                run: antivirus_processes,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::PasswordPolicy,
        probes: &[
            Probe {
                method: "pwquality",
                run: password_policy_pwquality,
            },
            Probe {
                method: "pam_common_password",
                run: password_policy_pam,
            },
            Probe {
                method: "login_defs",
                run: password_policy_login_defs,
            },
        ],
    },
    CheckProvider {
        check_type: CheckType::ScreenLock,
        probes: &[
            Probe {
                method: "gsettings",
                run: screen_lock_gsettings,
            },
            Probe {
                method: "xscreensaver",
                run: screen_lock_xscreensaver,
            },
        ],
    },
];

const FDE_EXCEPTION_NOTE: &str = "Linux のフルディスク暗号化はインストール時にのみ構成できるため、稼働中のシステムでは適用外として扱います（有効化には再インストールが必要です）";

const AV_SERVICE_NAMES: &[&str] = &[
    "clamav-daemon",
    "clamd",
    "falcon-sensor",
    "sophos",
    "savd",
    "eset",
];

const AV_BINARY_NAMES: &[&str] = &["clamscan", "clamdscan", "falcon-sensor", "savscan"];

fn disk_encryption_lsblk(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("lsblk", &["-rno", "NAME,TYPE,FSTYPE"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    if raw.is_empty() {
        return Ok(None);
    }
    if lsblk_has_crypt(&raw) {
        return Ok(Some(ProbeOutcome::pass(
            raw,
            "LUKS 暗号化ボリュームを検出しました",
        )));
    }
    Ok(Some(ProbeOutcome::pass_with_exception(
        raw,
        "ディスク暗号化は構成されていません",
        FDE_EXCEPTION_NOTE,
    )))
}

fn disk_encryption_dmsetup(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("dmsetup", &["status", "--target", "crypt"], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    let raw = out.stdout.trim().to_string();
    if raw.is_empty() || raw.contains("No devices found") {
        return Ok(None);
    }
    Ok(Some(ProbeOutcome::pass(
        raw,
        "アクティブな crypt マッピングを検出しました",
    )))
}

fn disk_encryption_crypttab(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let path = ctx.etc_dir.join("crypttab");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let configured = contents
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'));
    if configured {
        return Ok(Some(ProbeOutcome::pass(
            contents.trim().to_string(),
            "crypttab に暗号化デバイスが定義されています",
        )));
    }
    Ok(Some(ProbeOutcome::pass_with_exception(
        contents.trim().to_string(),
        "ディスク暗号化は構成されていません",
        FDE_EXCEPTION_NOTE,
    )))
}

fn antivirus_systemd_units(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command(
        "systemctl",
        &[
            "list-units",
            "--type=service",
            "--state=running",
            "--no-legend",
            "--plain",
        ],
        ctx.timeout,
    )?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    if let Some(unit) = find_av_service(&out.stdout) {
        return Ok(Some(ProbeOutcome::pass(
            unit.clone(),
            format!("ウイルス対策サービスが稼働しています: {unit}"),
        )));
    }
    Ok(None)
}

fn antivirus_known_binaries(_ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let Some(path_var) = std::env::var_os("PATH") else {
        return Ok(None);
    };
    for dir in std::env::split_paths(&path_var) {
        for name in AV_BINARY_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(Some(ProbeOutcome::pass(
                    candidate.display().to_string(),
                    format!("ウイルス対策ソフトを検出しました: {name}"),
                )));
            }
        }
    }
    Ok(None)
}

fn antivirus_processes(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let out = run_command("ps", &["-eo", "comm="], ctx.timeout)?;
    if out.exit_code != 0 {
        return Ok(None);
    }
    if let Some(proc_name) = find_av_process(&out.stdout) {
        return Ok(Some(ProbeOutcome::pass(
            proc_name.clone(),
            format!("ウイルス対策プロセスが稼働しています: {proc_name}"),
        )));
    }
    Ok(Some(ProbeOutcome::fail(
        out.stdout.trim().to_string(),
        "ウイルス対策ソフトが見つかりませんでした",
    )))
}

fn password_policy_pwquality(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let path = ctx.etc_dir.join("security/pwquality.conf");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let Some(minlen) = parse_pwquality_minlen(&contents) else {
        return Ok(None);
    };
    Ok(Some(password_verdict(minlen, format!("minlen = {minlen}"))))
}

fn password_policy_pam(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let path = ctx.etc_dir.join("pam.d/common-password");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let Some(minlen) = parse_pam_minlen(&contents) else {
        return Ok(None);
    };
    Ok(Some(password_verdict(minlen, format!("minlen={minlen}"))))
}

fn password_policy_login_defs(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let path = ctx.etc_dir.join("login.defs");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let Some(minlen) = parse_login_defs_min_len(&contents) else {
        return Ok(None);
    };
    Ok(Some(password_verdict(
        minlen,
        format!("PASS_MIN_LEN {minlen}"),
    )))
}

fn screen_lock_gsettings(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    // sudo 経由でもユーザー自身の設定を見る
    let lock = run_command_invoking_user(
        "gsettings",
        &["get", "org.gnome.desktop.screensaver", "lock-enabled"],
        ctx.timeout,
    )?;
    let idle = run_command_invoking_user(
        "gsettings",
        &["get", "org.gnome.desktop.session", "idle-delay"],
        ctx.timeout,
    )?;
    if lock.exit_code != 0 || idle.exit_code != 0 {
        return Ok(None);
    }

    let Some(lock_enabled) = parse_gsettings_bool(&lock.stdout) else {
        return Ok(None);
    };
    let Some(idle_secs) = parse_gsettings_uint(&idle.stdout) else {
        return Ok(None);
    };

    let raw = format!(
        "lock-enabled={} idle-delay={}",
        lock.stdout.trim(),
        idle.stdout.trim()
    );
    Ok(Some(screen_lock_verdict(idle_secs, lock_enabled, raw)))
}

fn screen_lock_xscreensaver(ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
    let path = ctx.home_dir.join(".xscreensaver");
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let Some((timeout_secs, lock)) = parse_xscreensaver(&contents) else {
        return Ok(None);
    };
    let raw = format!("timeout={timeout_secs}s lock={lock}");
    Ok(Some(screen_lock_verdict(timeout_secs, lock, raw)))
}

pub(crate) fn lsblk_has_crypt(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        let mut cols = line.split_whitespace();
        let _name = cols.next();
        let device_type = cols.next().unwrap_or("");
        let fstype = cols.next().unwrap_or("");
        device_type == "crypt" || fstype == "crypto_LUKS"
    })
}

pub(crate) fn find_av_service(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let unit = line.split_whitespace().next().unwrap_or("");
        for known in AV_SERVICE_NAMES {
            if unit.contains(known) {
                return Some(unit.to_string());
            }
        }
    }
    None
}

pub(crate) fn find_av_process(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let name = line.trim();
        for known in AV_SERVICE_NAMES {
            if !name.is_empty() && name.contains(known) {
                return Some(name.to_string());
            }
        }
    }
    None
}

pub(crate) fn parse_pwquality_minlen(contents: &str) -> Option<u32> {
    for line in contents.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == "minlen" {
            return value.trim().parse::<u32>().ok();
        }
    }
    None
}

pub(crate) fn parse_pam_minlen(contents: &str) -> Option<u32> {
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        for token in line.split_whitespace() {
            if let Some(value) = token.strip_prefix("minlen=") {
                return value.parse::<u32>().ok();
            }
        }
    }
    None
}

pub(crate) fn parse_login_defs_min_len(contents: &str) -> Option<u32> {
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut cols = line.split_whitespace();
        if cols.next() == Some("PASS_MIN_LEN") {
            return cols.next()?.parse::<u32>().ok();
        }
    }
    None
}

pub(crate) fn parse_gsettings_bool(stdout: &str) -> Option<bool> {
    match stdout.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_gsettings_uint(stdout: &str) -> Option<u32> {
    let value = stdout.trim();
    let value = value.strip_prefix("uint32").unwrap_or(value).trim();
    value.parse::<u32>().ok()
}

pub(crate) fn parse_xscreensaver(contents: &str) -> Option<(u32, bool)> {
    let mut timeout_secs = None;
    let mut lock = None;
    for line in contents.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("timeout:") {
            timeout_secs = parse_clock_duration(value.trim());
        } else if let Some(value) = line.strip_prefix("lock:") {
            lock = Some(value.trim().eq_ignore_ascii_case("true"));
        }
    }
    Some((timeout_secs?, lock?))
}

fn parse_clock_duration(value: &str) -> Option<u32> {
    let mut secs: u32 = 0;
    for part in value.split(':') {
        secs = secs
            .checked_mul(60)?
            .checked_add(part.trim().parse::<u32>().ok()?)?;
    }
    Some(secs)
}
