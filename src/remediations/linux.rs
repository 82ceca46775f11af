use crate::core::{CheckType, RemediationInfo, RemediationResult, RemediationType};
use crate::platform::{run_command, run_command_invoking_user};
use crate::remediations::{
    RemediationContext, RemediationProvider, classify_pkexec, elevation_result, guide_only_result,
};

pub static PROVIDERS: &[RemediationProvider] = &[
    RemediationProvider {
        check_type: CheckType::DiskEncryption,
        info: disk_encryption_info,
        run: disk_encryption_run,
    },
    RemediationProvider {
        check_type: CheckType::Antivirus,
        info: antivirus_info,
        run: antivirus_run,
    },
    RemediationProvider {
        check_type: CheckType::PasswordPolicy,
        info: password_policy_info,
        run: password_policy_run,
    },
    RemediationProvider {
        check_type: CheckType::ScreenLock,
        info: screen_lock_info,
        run: screen_lock_run,
    },
];

fn disk_encryption_info() -> RemediationInfo {
    RemediationInfo {
        available: false,
        remediation_type: RemediationType::GuideOnly,
        requires_admin: true,
        description: "Linux のフルディスク暗号化（LUKS）は OS の再インストール時にのみ構成できます".to_string(),
        steps: vec![
            "データを完全にバックアップする".to_string(),
            "ディストリビューションのインストーラで「ディスクを暗号化する（LUKS）」を選択して再インストールする".to_string(),
            "復旧用パスフレーズを安全な場所に保管する".to_string(),
        ],
        settings_url: None,
    }
}

fn disk_encryption_run(_ctx: &RemediationContext) -> RemediationResult {
    guide_only_result()
}

fn antivirus_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::GuideOnly,
        requires_admin: true,
        description: "組織が指定するウイルス対策ソフト（例: ClamAV）を導入してください".to_string(),
        steps: vec![
            "Debian/Ubuntu: sudo apt install clamav clamav-daemon".to_string(),
            "Fedora/RHEL: sudo dnf install clamav clamd".to_string(),
            "サービスを有効化: sudo systemctl enable --now clamav-daemon".to_string(),
            "インストール後、チェックを再実行する".to_string(),
        ],
        settings_url: None,
    }
}

fn antivirus_run(_ctx: &RemediationContext) -> RemediationResult {
    guide_only_result()
}

fn password_policy_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::AdminFix,
        requires_admin: true,
        description: "pwquality の minlen を 8 に設定します（認証ダイアログが表示されます）".to_string(),
        steps: vec![
            "実行すると pkexec の認証ダイアログが表示されます".to_string(),
            "認証後、/etc/security/pwquality.conf に minlen = 8 が書き込まれます".to_string(),
        ],
        settings_url: None,
    }
}

fn password_policy_run(ctx: &RemediationContext) -> RemediationResult {
    let script = r#"conf=/etc/security/pwquality.conf; mkdir -p "$(dirname "$conf")"; if grep -q '^\s*minlen' "$conf" 2>/dev/null; then sed -i 's/^\s*minlen.*/minlen = 8/' "$conf"; else printf 'minlen = 8\n' >> "$conf"; fi"#;
    match run_command("pkexec", &["sh", "-c", script], ctx.admin_timeout) {
        Ok(output) => elevation_result(
            classify_pkexec(&output),
            "最小パスワード長を 8 文字に設定しました",
        ),
        Err(err) => RemediationResult::failed(format!("pkexec の実行に失敗しました: {err:#}")),
    }
}

fn screen_lock_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::AutoFix,
        requires_admin: false,
        description: "GNOME の画面ロックを 5 分で作動し、ロックを有効にするよう設定します".to_string(),
        steps: vec![
            "アイドル時間を 300 秒に設定".to_string(),
            "画面ロックを有効化（猶予 0 秒）".to_string(),
        ],
        settings_url: None,
    }
}

fn screen_lock_run(ctx: &RemediationContext) -> RemediationResult {
    let commands: [(&str, &[&str]); 3] = [
        (
            "gsettings",
            &["set", "org.gnome.desktop.session", "idle-delay", "300"],
        ),
        (
            "gsettings",
            &["set", "org.gnome.desktop.screensaver", "lock-enabled", "true"],
        ),
        (
            "gsettings",
            &["set", "org.gnome.desktop.screensaver", "lock-delay", "0"],
        ),
    ];

    for (cmd, args) in commands {
        // ユーザー自身の設定として書き込む
        match run_command_invoking_user(cmd, args, ctx.timeout) {
            Ok(output) if output.exit_code == 0 => {}
            Ok(output) => {
                return RemediationResult::failed(format!(
                    "gsettings の書き込みに失敗しました（exit_code={} stderr={}）",
                    output.exit_code,
                    output.stderr.trim()
                ));
            }
            Err(err) => {
                return RemediationResult::failed(format!(
                    "gsettings の実行に失敗しました: {err:#}"
                ));
            }
        }
    }
    RemediationResult::succeeded(
        "画面ロックを設定しました（300 秒で作動、ロック有効）",
    )
}
