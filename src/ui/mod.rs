use anyhow::Error;
use std::io::{self, Write};

use crate::agent::RemediationOutcome;
use crate::core::{CheckResult, DeviceInfo, RemediationInfo, StoredAuth};
use crate::reporter::ReportOutcome;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `complyd --help` を参照してください"
    );
}

pub fn print_check_results(results: &[CheckResult], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    for result in results {
        let mark = verdict_mark(result.passed, cfg.color);
        println!(
            "{mark} {}: {}",
            result.check_type.display_name(),
            result.details.message
        );
        if let Some(exception) = &result.details.exception {
            println!("    例外: {exception}");
        }
        if cfg.verbose {
            println!("    検出方法: {}", result.details.method);
            println!("    確認時刻: {}", result.checked_at);
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    println!();
    println!("合格 {passed} / {}", results.len());
}

pub fn print_report_outcome(report: &ReportOutcome, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    if report.all_succeeded {
        println!("ポータルへの送信: 完了");
    } else {
        println!("ポータルへの送信: 一部失敗");
        for failure in &report.failures {
            println!("  - {failure}");
        }
    }
    if report.session_expired {
        println!("セッションが失効しています。`complyd login` で再ログインしてください");
    }
}

pub fn print_status(
    auth: Option<&StoredAuth>,
    last_results: &[CheckResult],
    interval_secs: u64,
    portal_base_url: &str,
    cfg: &UiConfig,
) {
    if cfg.quiet {
        return;
    }

    println!("ポータル: {portal_base_url}");
    match auth {
        Some(auth) => {
            println!("ログイン: 済み（ユーザー: {}）", auth.user_id);
            for org in &auth.orgs {
                println!("  組織: {}（デバイス ID: {}）", org.organization_name, org.device_id);
            }
        }
        None => {
            println!("ログイン: 未ログイン（`complyd login` を実行してください）");
        }
    }
    println!("チェック間隔: {interval_secs} 秒");

    if last_results.is_empty() {
        println!("前回のチェック結果: なし");
        return;
    }
    println!("前回のチェック結果（{}）:", last_results[0].checked_at);
    for result in last_results {
        let mark = verdict_mark(result.passed, cfg.color);
        println!("  {mark} {}", result.check_type.display_name());
    }
}

pub fn print_device_info(device: &DeviceInfo, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    println!("表示名: {}", device.display_name);
    println!("ホスト名: {}", device.hostname);
    println!("プラットフォーム: {}", device.platform);
    println!("OS バージョン: {}", device.os_version);
    if let Some(serial) = &device.serial_number {
        println!("シリアル番号: {serial}");
    }
    if let Some(model) = &device.hardware_model {
        println!("ハードウェアモデル: {model}");
    }
}

pub fn print_remediation_info(info: &RemediationInfo, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    println!("{}", info.description);
    println!("種別: {}", info.remediation_type.as_str());
    if info.requires_admin {
        println!("管理者権限: 必要");
    }
    println!("手順:");
    for (i, step) in info.steps.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    if let Some(url) = &info.settings_url {
        println!("設定画面: {url}");
    }
}

pub fn print_remediation_outcome(outcome: &RemediationOutcome, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mark = verdict_mark(outcome.result.success, cfg.color);
    println!("{mark} {}", outcome.result.message);

    if let Some(recheck) = &outcome.recheck {
        println!();
        println!("再チェック:");
        print_check_results(&recheck.results, cfg);
        if let Some(report) = &recheck.report {
            print_report_outcome(report, cfg);
        }
    }
}

fn verdict_mark(passed: bool, color: bool) -> String {
    let (symbol, code) = if passed { ("✓", "32") } else { ("✗", "31") };
    if !color {
        return symbol.to_string();
    }
    format!("\x1b[{code}m{symbol}\x1b[0m")
}
