use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{CheckResult, CheckType, RemediationResult, RemediationType};
use crate::reporter::ReportOutcome;

const MAX_RAW_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct CheckCycleLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: String,
    results: Vec<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ReportLogEntry>,
}

#[derive(Debug, Serialize)]
struct ReportLogEntry {
    all_succeeded: bool,
    is_compliant: bool,
    session_expired: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RemediationLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: String,
    check_type: String,
    remediation_type: String,
    result: RemediationResult,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/complyd/logs")
}

pub fn write_check_cycle_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    results: &[CheckResult],
    report: Option<&ReportOutcome>,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let file_name = format!("check-cycle-{pid}-{ts}.json");
    let path = dir.join(file_name);

    let status = match report {
        Some(report) if !report.all_succeeded => "error".to_string(),
        Some(report) if !report.is_compliant => "noncompliant".to_string(),
        Some(_) => "ok".to_string(),
        None if results.iter().all(|r| r.passed) => "ok".to_string(),
        None => "noncompliant".to_string(),
    };

    let results: Vec<CheckResult> = results.iter().map(truncated_result).collect();

    let log = CheckCycleLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "check",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        status,
        results,
        report: report.map(|r| ReportLogEntry {
            all_succeeded: r.all_succeeded,
            is_compliant: r.is_compliant,
            session_expired: r.session_expired,
            failures: r.failures.clone(),
        }),
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

pub fn write_remediation_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    check_type: CheckType,
    remediation_type: RemediationType,
    result: &RemediationResult,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let file_name = format!("remediate-{pid}-{ts}.json");
    let path = dir.join(file_name);

    let status = if result.success { "ok" } else { "error" }.to_string();

    let log = RemediationLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "remediate",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        status,
        check_type: check_type.as_str().to_string(),
        remediation_type: remediation_type.as_str().to_string(),
        result: result.clone(),
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

fn truncated_result(result: &CheckResult) -> CheckResult {
    let mut result = result.clone();
    truncate_utf8(&mut result.details.raw, MAX_RAW_OUTPUT_BYTES);
    result
}

fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s.push_str("\n…（省略）");
}
