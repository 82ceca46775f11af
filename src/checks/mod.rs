use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::core::{CheckResult, CheckType, Platform};

pub mod linux;
pub mod macos;
pub mod windows;

pub const MIN_PASSWORD_LENGTH: u32 = 8;
pub const MAX_LOCK_TIMEOUT_SECS: u32 = 300;

#[derive(Debug, Clone)]
pub struct CheckContext {
    pub timeout: Duration,
    pub home_dir: PathBuf,
    pub etc_dir: PathBuf,
}

impl CheckContext {
    pub fn new(timeout: Duration, home_dir: PathBuf) -> Self {
        Self {
            timeout,
            home_dir,
            etc_dir: PathBuf::from("/etc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub passed: bool,
    pub raw: String,
    pub message: String,
    pub exception: Option<String>,
}

impl ProbeOutcome {
    pub fn pass(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            passed: true,
            raw: raw.into(),
            message: message.into(),
            exception: None,
        }
    }

    pub fn fail(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            raw: raw.into(),
            message: message.into(),
            exception: None,
        }
    }

    pub fn pass_with_exception(
        raw: impl Into<String>,
        message: impl Into<String>,
        exception: impl Into<String>,
    ) -> Self {
        Self {
            passed: true,
            raw: raw.into(),
            message: message.into(),
            exception: Some(exception.into()),
        }
    }
}

pub type ProbeFn = fn(&CheckContext) -> Result<Option<ProbeOutcome>>;

#[derive(Clone, Copy)]
pub struct Probe {
    pub method: &'static str,
    pub run: ProbeFn,
}

#[derive(Clone, Copy)]
pub struct CheckProvider {
    pub check_type: CheckType,
    pub probes: &'static [Probe],
}

impl CheckProvider {
    pub fn display_name(&self) -> &'static str {
        self.check_type.display_name()
    }

    pub fn run(&self, ctx: &CheckContext) -> CheckResult {
        run_probes(self.check_type, self.probes, ctx)
    }
}

pub fn run_probes(check_type: CheckType, probes: &[Probe], ctx: &CheckContext) -> CheckResult {
    let mut transcript = Vec::new();

    for probe in probes {
        match (probe.run)(ctx) {
            Ok(Some(outcome)) => {
                let ProbeOutcome {
                    passed,
                    raw,
                    message,
                    exception,
                } = outcome;
                return if passed {
                    match exception {
                        Some(exception) => CheckResult::passed_with_exception(
                            check_type,
                            probe.method,
                            raw,
                            message,
                            exception,
                        ),
                        None => CheckResult::passed(check_type, probe.method, raw, message),
                    }
                } else {
                    CheckResult::failed(check_type, probe.method, raw, message)
                };
            }
            Ok(None) => {
                transcript.push(format!("{}: 判定材料なし", probe.method));
            }
            Err(err) => {
                transcript.push(format!("{}: {err:#}", probe.method));
            }
        }
    }

    let mut result = CheckResult::undetermined(
        check_type,
        format!(
            "{}の状態を判定できませんでした（全ての検出方法が失敗）",
            check_type.display_name()
        ),
    );
    result.details.raw = transcript.join("\n");
    result
}

pub fn providers_for(platform: Platform) -> &'static [CheckProvider] {
    match platform {
        Platform::Macos => macos::PROVIDERS,
        Platform::Linux => linux::PROVIDERS,
        Platform::Windows => windows::PROVIDERS,
    }
}

pub fn run_all_checks(platform: Platform, ctx: &CheckContext) -> Vec<CheckResult> {
    run_provider_set(providers_for(platform), ctx)
}

pub fn run_provider_set(providers: &[CheckProvider], ctx: &CheckContext) -> Vec<CheckResult> {
    providers
        .iter()
        .map(|provider| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| provider.run(ctx)))
                .unwrap_or_else(|_| {
                    CheckResult::undetermined(
                        provider.check_type,
                        format!(
                            "{}のチェック実行中に内部エラーが発生しました",
                            provider.display_name()
                        ),
                    )
                })
        })
        .collect()
}

pub fn password_length_passes(min_len: u32) -> bool {
    min_len >= MIN_PASSWORD_LENGTH
}

pub fn screen_lock_passes(idle_timeout_secs: u32, password_required: bool) -> bool {
    idle_timeout_secs > 0 && idle_timeout_secs <= MAX_LOCK_TIMEOUT_SECS && password_required
}

pub(crate) fn password_verdict(minlen: u32, raw: String) -> ProbeOutcome {
    if password_length_passes(minlen) {
        ProbeOutcome::pass(
            raw,
            format!("最小パスワード長は {minlen} 文字です（基準: 8 文字以上）"),
        )
    } else {
        ProbeOutcome::fail(
            raw,
            format!("最小パスワード長 {minlen} 文字は基準（8 文字以上）を満たしません"),
        )
    }
}

pub(crate) fn screen_lock_verdict(
    idle_secs: u32,
    password_required: bool,
    raw: String,
) -> ProbeOutcome {
    if screen_lock_passes(idle_secs, password_required) {
        ProbeOutcome::pass(
            raw,
            format!("画面ロックは {idle_secs} 秒で作動し、解除にパスワードが必要です"),
        )
    } else if !password_required {
        ProbeOutcome::fail(raw, "画面ロック解除にパスワードが要求されていません")
    } else {
        ProbeOutcome::fail(
            raw,
            format!("画面ロックまでの時間 {idle_secs} 秒が基準（300 秒以内）を満たしません"),
        )
    }
}
