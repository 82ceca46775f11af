use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationType {
    AutoFix,
    AdminFix,
    OpenSettings,
    GuideOnly,
}

impl RemediationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoFix => "auto_fix",
            Self::AdminFix => "admin_fix",
            Self::OpenSettings => "open_settings",
            Self::GuideOnly => "guide_only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationInfo {
    pub available: bool,
    #[serde(rename = "type")]
    pub remediation_type: RemediationType,
    pub requires_admin: bool,
    pub description: String,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_settings: Option<bool>,
}

impl RemediationResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            opened_settings: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            opened_settings: None,
        }
    }

    pub fn opened_settings(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            opened_settings: Some(true),
        }
    }
}
