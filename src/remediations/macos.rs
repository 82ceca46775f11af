use crate::core::{CheckType, Platform, RemediationInfo, RemediationResult, RemediationType};
use crate::platform::{open_url, run_command, run_command_invoking_user};
use crate::remediations::{
    RemediationContext, RemediationProvider, classify_osascript, elevation_result,
    guide_only_result,
};

const FILEVAULT_PANE: &str = "x-apple.systempreferences:com.apple.preference.security?FDE";

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
        description: "FileVault の設定画面を開きます（有効化には管理者権限が必要です）".to_string(),
        steps: vec![
            "システム設定 → プライバシーとセキュリティ → FileVault を開く".to_string(),
            "「オンにする」をクリックし、管理者パスワードを入力する".to_string(),
            "復旧キーを安全な場所に保管する".to_string(),
        ],
        settings_url: Some(FILEVAULT_PANE.to_string()),
    }
}

fn disk_encryption_run(ctx: &RemediationContext) -> RemediationResult {
    match open_url(Platform::Macos, FILEVAULT_PANE, ctx.timeout) {
        Ok(()) => RemediationResult::opened_settings(
            "FileVault の設定画面を開きました。画面の手順に従って有効化してください",
        ),
        Err(err) => RemediationResult::failed(format!("設定画面を開けませんでした: {err:#}")),
    }
}

fn antivirus_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::GuideOnly,
        requires_admin: false,
        description: "macOS には XProtect が組み込まれています。検出されない場合は組織指定のウイルス対策ソフトを導入してください".to_string(),
        steps: vec![
            "組織が指定するウイルス対策ソフトの有無を確認する".to_string(),
            "未導入の場合は管理者に配布手順を確認する".to_string(),
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
        description: "最小パスワード長を 8 文字に設定します（管理者認証が必要です）".to_string(),
        steps: vec![
            "実行すると管理者パスワードの入力を求められます".to_string(),
            "認証後、pwpolicy によりローカルポリシーが更新されます".to_string(),
        ],
        settings_url: None,
    }
}

fn password_policy_run(ctx: &RemediationContext) -> RemediationResult {
    let script = r#"do shell script "pwpolicy -n /Local/Default -setglobalpolicy minChars=8" with administrator privileges"#;
    match run_command("osascript", &["-e", script], ctx.admin_timeout) {
        Ok(output) => elevation_result(
            classify_osascript(&output),
            "最小パスワード長を 8 文字に設定しました",
        ),
        Err(err) => RemediationResult::failed(format!("osascript の実行に失敗しました: {err:#}")),
    }
}

fn screen_lock_info() -> RemediationInfo {
    RemediationInfo {
        available: true,
        remediation_type: RemediationType::AutoFix,
        requires_admin: false,
        description: "スクリーンセーバを 5 分で起動し、解除時にパスワードを要求するよう設定します".to_string(),
        steps: vec![
            "スクリーンセーバ起動までの時間を 300 秒に設定".to_string(),
            "解除時のパスワード要求を有効化（猶予 0 秒）".to_string(),
        ],
        settings_url: None,
    }
}

fn screen_lock_run(ctx: &RemediationContext) -> RemediationResult {
    let commands: [(&str, &[&str]); 3] = [
        (
            "defaults",
            &["-currentHost", "write", "com.apple.screensaver", "idleTime", "-int", "300"],
        ),
        (
            "defaults",
            &["write", "com.apple.screensaver", "askForPassword", "-int", "1"],
        ),
        (
            "defaults",
            &["write", "com.apple.screensaver", "askForPasswordDelay", "-int", "0"],
        ),
    ];

    for (cmd, args) in commands {
        // ユーザー自身の設定として書き込む
        match run_command_invoking_user(cmd, args, ctx.timeout) {
            Ok(output) if output.exit_code == 0 => {}
            Ok(output) => {
                return RemediationResult::failed(format!(
                    "設定の書き込みに失敗しました（exit_code={}）: {cmd}",
                    output.exit_code
                ));
            }
            Err(err) => {
                return RemediationResult::failed(format!("設定の書き込みに失敗しました: {err:#}"));
            }
        }
    }
    RemediationResult::succeeded(
        "画面ロックを設定しました（300 秒で起動、解除にパスワードが必要）",
    )
}
