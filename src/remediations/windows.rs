use crate::core::{CheckType, Platform, RemediationInfo, RemediationResult, RemediationType};
use crate::platform::{open_url, run_command};
use crate::remediations::{
    RemediationContext, RemediationProvider, classify_runas, elevation_result,
};

const DEVICE_ENCRYPTION_PANE: &str = "ms-settings:deviceencryption";
const DEFENDER_PANE: &str = "windowsdefender://threat/";

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
        available: true,
        remediation_type: RemediationType::OpenSettings,
        requires_admin: true,
        description: "デバイスの暗号化（BitLocker）の設定画面を開きます".to_string(),
        steps: vec![
            "設定 → プライバシーとセキュリティ → デバイスの暗号化 を開く".to_string(),
            "「デバイスの暗号化」をオンにする".to_string(),
            "回復キーを Microsoft アカウントまたは安全な場所に保管する".to_string(),
        ],
        settings_url: Some(DEVICE_ENCRYPTION_PANE.to_string()),
    }
}

fn disk_encryption_run(ctx: &RemediationContext) -> RemediationResult {
    match open_url(Platform::Windows, DEVICE_ENCRYPTION_PANE, ctx.timeout) {
        Ok(()) => RemediationResult::opened_settings(
            "デバイスの暗号化の設定画面を開きました。画面の手順に従って有効化してください",
        ),
        Err(err) => RemediationResult::failed(format!("設定画面を開けませんでした: {err:#}")),
    }
}

fn antivirus_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::OpenSettings,
        requires_admin: false,
        description: "Windows セキュリティのウイルスと脅威の防止画面を開きます".to_string(),
        steps: vec![
            "Windows セキュリティ → ウイルスと脅威の防止 を開く".to_string(),
            "リアルタイム保護をオンにする".to_string(),
        ],
        settings_url: Some(DEFENDER_PANE.to_string()),
    }
}

fn antivirus_run(ctx: &RemediationContext) -> RemediationResult {
    match open_url(Platform::Windows, DEFENDER_PANE, ctx.timeout) {
        Ok(()) => RemediationResult::opened_settings(
            "Windows セキュリティを開きました。リアルタイム保護を有効化してください",
        ),
        Err(err) => RemediationResult::failed(format!("設定画面を開けませんでした: {err:#}")),
    }
}

fn password_policy_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::AdminFix,
        requires_admin: true,
        description: "最小パスワード長を 8 文字に設定します（UAC の昇格確認が表示されます）".to_string(),
        steps: vec![
            "実行すると UAC の昇格確認が表示されます".to_string(),
            "承認後、net accounts /minpwlen:8 が実行されます".to_string(),
        ],
        settings_url: None,
    }
}

fn password_policy_run(ctx: &RemediationContext) -> RemediationResult {
    let script = "Start-Process -FilePath net -ArgumentList 'accounts','/minpwlen:8' -Verb RunAs -Wait";
    match run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        ctx.admin_timeout,
    ) {
        Ok(output) => elevation_result(
            classify_runas(&output),
            "最小パスワード長を 8 文字に設定しました",
        ),
        Err(err) => RemediationResult::failed(format!("PowerShell の実行に失敗しました: {err:#}")),
    }
}

fn screen_lock_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::AutoFix,
        requires_admin: false,
        description: "スクリーンセーバを 5 分で起動し、再開時にサインインを要求するよう設定します".to_string(),
        steps: vec![
            "スクリーンセーバの待ち時間を 300 秒に設定".to_string(),
            "再開時にログオン画面を表示するよう設定".to_string(),
        ],
        settings_url: None,
    }
}

fn screen_lock_run(ctx: &RemediationContext) -> RemediationResult {
    let desktop_key = r"HKCU\Control Panel\Desktop";
    let commands: [(&str, &[&str]); 3] = [
        (
            "reg",
            &["add", desktop_key, "/v", "ScreenSaveTimeOut", "/t", "REG_SZ", "/d", "300", "/f"],
        ),
        (
            "reg",
            &["add", desktop_key, "/v", "ScreenSaveActive", "/t", "REG_SZ", "/d", "1", "/f"],
        ),
        (
            "reg",
            &["add", desktop_key, "/v", "ScreenSaverIsSecure", "/t", "REG_SZ", "/d", "1", "/f"],
        ),
    ];

    for (cmd, args) in commands {
        match run_command(cmd, args, ctx.timeout) {
            Ok(output) if output.exit_code == 0 => {}
            Ok(output) => {
                return RemediationResult::failed(format!(
                    "レジストリの書き込みに失敗しました（exit_code={}）",
                    output.exit_code
                ));
            }
            Err(err) => {
                return RemediationResult::failed(format!(
                    "レジストリの書き込みに失敗しました: {err:#}"
                ));
            }
        }
    }
    RemediationResult::succeeded(
        "画面ロックを設定しました（300 秒で起動、再開時にサインインが必要）",
    )
}
