use std::path::PathBuf;
use std::time::Duration;

use crate::core::{CheckType, Platform, RemediationInfo, RemediationResult};
use crate::platform::CommandOutput;

pub mod linux;
pub mod macos;
pub mod windows;

#[derive(Debug, Clone)]
pub struct RemediationContext {
    pub timeout: Duration,
    pub admin_timeout: Duration,
    pub home_dir: PathBuf,
}

impl RemediationContext {
    pub fn new(timeout: Duration, home_dir: PathBuf) -> Self {
        Self {
            timeout,
            // 昇格プロンプトは人の操作を待つ
            admin_timeout: Duration::from_secs(60),
            home_dir,
        }
    }
}

#[derive(Clone, Copy)]
pub struct RemediationProvider {
    pub check_type: CheckType,
    pub info: fn() -> RemediationInfo,
    pub run: fn(&RemediationContext) -> RemediationResult,
}

pub fn providers_for(platform: Platform) -> &'static [RemediationProvider] {
    match platform {
        Platform::Macos => macos::PROVIDERS,
        Platform::Linux => linux::PROVIDERS,
        Platform::Windows => windows::PROVIDERS,
    }
}

pub fn provider_for(platform: Platform, check_type: CheckType) -> Option<&'static RemediationProvider> {
    providers_for(platform)
        .iter()
        .find(|provider| provider.check_type == check_type)
}

pub fn guide_only_result() -> RemediationResult {
    RemediationResult::failed(
        "自動修復には対応していません。表示された手順に従って設定してください",
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevationOutcome {
    Completed,
    CancelledByUser,
    Failed(String),
}

pub(crate) fn classify_osascript(output: &CommandOutput) -> ElevationOutcome {
    if output.exit_code == 0 {
        return ElevationOutcome::Completed;
    }
    if output.stderr.contains("User canceled") || output.stderr.contains("(-128)") {
        return ElevationOutcome::CancelledByUser;
    }
    ElevationOutcome::Failed(format!(
        "exit_code={} stderr={}",
        output.exit_code,
        output.stderr.trim()
    ))
}

pub(crate) fn classify_pkexec(output: &CommandOutput) -> ElevationOutcome {
    match output.exit_code {
        0 => ElevationOutcome::Completed,
        126 => ElevationOutcome::CancelledByUser,
        127 => ElevationOutcome::Failed("認証に失敗しました（pkexec）".to_string()),
        code => ElevationOutcome::Failed(format!(
            "exit_code={code} stderr={}",
            output.stderr.trim()
        )),
    }
}

pub(crate) fn classify_runas(output: &CommandOutput) -> ElevationOutcome {
    if output.exit_code == 0 {
        return ElevationOutcome::Completed;
    }
    if output.stderr.contains("canceled by the user") {
        return ElevationOutcome::CancelledByUser;
    }
    ElevationOutcome::Failed(format!(
        "exit_code={} stderr={}",
        output.exit_code,
        output.stderr.trim()
    ))
}

pub(crate) fn elevation_result(outcome: ElevationOutcome, success_message: &str) -> RemediationResult {
    match outcome {
        ElevationOutcome::Completed => RemediationResult::succeeded(success_message),
        ElevationOutcome::CancelledByUser => RemediationResult::failed(
            "管理者認証がキャンセルされたため、変更は行われませんでした",
        ),
        ElevationOutcome::Failed(detail) => {
            RemediationResult::failed(format!("修復コマンドが失敗しました: {detail}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn osascript_cancellation_is_not_a_technical_failure() {
        let cancelled = classify_osascript(&output(
            1,
            "execution error: User canceled. (-128)",
        ));
        assert_eq!(cancelled, ElevationOutcome::CancelledByUser);

        let failed = classify_osascript(&output(1, "syntax error"));
        assert!(matches!(failed, ElevationOutcome::Failed(_)));
        assert_eq!(classify_osascript(&output(0, "")), ElevationOutcome::Completed);
    }

    #[test]
    fn pkexec_dismissal_maps_to_cancellation() {
        assert_eq!(classify_pkexec(&output(126, "")), ElevationOutcome::CancelledByUser);
        assert!(matches!(classify_pkexec(&output(127, "")), ElevationOutcome::Failed(_)));
        assert_eq!(classify_pkexec(&output(0, "")), ElevationOutcome::Completed);
    }

    #[test]
    fn runas_cancellation_maps_to_cancellation() {
        let cancelled = classify_runas(&output(
            1,
            "Start-Process : This command cannot be run ... The operation was canceled by the user.",
        ));
        assert_eq!(cancelled, ElevationOutcome::CancelledByUser);
    }

    #[test]
    fn cancellation_message_is_distinct_from_failure() {
        let cancelled = elevation_result(ElevationOutcome::CancelledByUser, "ok");
        let failed = elevation_result(ElevationOutcome::Failed("boom".to_string()), "ok");
        assert!(!cancelled.success);
        assert!(!failed.success);
        assert_ne!(cancelled.message, failed.message);
        assert!(cancelled.message.contains("キャンセル"));
    }

    #[test]
    fn every_platform_has_a_provider_per_check_type() {
        for platform in [Platform::Macos, Platform::Linux, Platform::Windows] {
            for check_type in CheckType::ALL {
                let provider = provider_for(platform, check_type);
                assert!(
                    provider.is_some(),
                    "missing provider: {platform} {check_type}"
                );
                let info = (provider.unwrap().info)();
                assert!(!info.steps.is_empty(), "no steps: {platform} {check_type}");
            }
        }
    }

    #[test]
    fn guide_only_providers_never_claim_success() {
        use crate::core::RemediationType;

        let ctx = RemediationContext::new(Duration::from_secs(1), std::env::temp_dir());
        for platform in [Platform::Macos, Platform::Linux, Platform::Windows] {
            for provider in providers_for(platform) {
                let info = (provider.info)();
                if info.remediation_type != RemediationType::GuideOnly {
                    continue;
                }
                let result = (provider.run)(&ctx);
                assert!(!result.success);
                assert_eq!(result.opened_settings, None);
            }
        }
    }
}
