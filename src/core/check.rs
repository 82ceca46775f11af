use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    DiskEncryption,
    Antivirus,
    PasswordPolicy,
    ScreenLock,
}

impl CheckType {
    pub const ALL: [CheckType; 4] = [
        CheckType::DiskEncryption,
        CheckType::Antivirus,
        CheckType::PasswordPolicy,
        CheckType::ScreenLock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckType::DiskEncryption => "disk_encryption",
            CheckType::Antivirus => "antivirus",
            CheckType::PasswordPolicy => "password_policy",
            CheckType::ScreenLock => "screen_lock",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CheckType::DiskEncryption => "ディスク暗号化",
            CheckType::Antivirus => "ウイルス対策",
            CheckType::PasswordPolicy => "パスワードポリシー",
            CheckType::ScreenLock => "画面ロック",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "disk_encryption" => Ok(CheckType::DiskEncryption),
            "antivirus" => Ok(CheckType::Antivirus),
            "password_policy" => Ok(CheckType::PasswordPolicy),
            "screen_lock" => Ok(CheckType::ScreenLock),
            other => Err(format!(
                "不明なチェック種別です: {other}（disk_encryption|antivirus|password_policy|screen_lock を指定してください）"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetails {
    pub method: String,
    pub raw: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check_type: CheckType,
    pub passed: bool,
    pub details: CheckDetails,
    pub checked_at: String,
}

impl CheckResult {
    pub fn passed(
        check_type: CheckType,
        method: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::build(check_type, true, method, raw, message, None)
    }

    pub fn passed_with_exception(
        check_type: CheckType,
        method: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
        exception: impl Into<String>,
    ) -> Self {
        Self::build(check_type, true, method, raw, message, Some(exception.into()))
    }

    pub fn failed(
        check_type: CheckType,
        method: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::build(check_type, false, method, raw, message, None)
    }

    pub fn undetermined(check_type: CheckType, message: impl Into<String>) -> Self {
        Self::build(check_type, false, "none", "", message, None)
    }

    fn build(
        check_type: CheckType,
        passed: bool,
        method: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
        exception: Option<String>,
    ) -> Self {
        Self {
            check_type,
            passed,
            details: CheckDetails {
                method: method.into(),
                raw: raw.into(),
                message: message.into(),
                exception,
            },
            checked_at: now_rfc3339(),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
