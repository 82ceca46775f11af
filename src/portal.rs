use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{CheckResult, DeviceInfo};

pub const COOKIE_NAMES: [&str; 2] = ["portal_session", "__Secure-portal_session"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("セッションの有効期限が切れています（401）")]
    SessionExpired,
    #[error("ポータルがエラーを返しました（status={status}）: {body}")]
    Status { status: u16, body: String },
    #[error("ポータルとの通信に失敗しました: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub organization_id: String,
    pub organization_name: String,
    #[serde(default)]
    pub organization_slug: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    #[serde(flatten)]
    device: &'a DeviceInfo,
    agent_version: &'a str,
    organization_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    device_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckInRequest<'a> {
    device_id: &'a str,
    checks: &'a [CheckResult],
    agent_version: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub is_compliant: bool,
    #[serde(default)]
    pub next_check_in: Option<String>,
}

pub trait Portal {
    fn identity(&self, session: &SessionCookie) -> Result<Identity, PortalError>;

    fn my_organizations(&self, session: &SessionCookie) -> Result<Vec<Organization>, PortalError>;

    fn register_device(
        &self,
        session: &SessionCookie,
        organization_id: &str,
        device: &DeviceInfo,
        agent_version: &str,
    ) -> Result<String, PortalError>;

    fn check_in(
        &self,
        session: &SessionCookie,
        device_id: &str,
        checks: &[CheckResult],
        agent_version: &str,
    ) -> Result<CheckInResponse, PortalError>;
}

pub struct PortalClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PortalClient {
    pub fn new(base_url: &str) -> Result<Self, PortalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sign_in_url(&self) -> String {
        format!("{}/sign-in", self.base_url)
    }

    fn get(&self, path: &str, session: &SessionCookie) -> Result<reqwest::blocking::Response, PortalError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header(reqwest::header::COOKIE, session.header_value())
            .send()?;
        check_status(response)
    }

    fn post_json<T: Serialize>(
        &self,
        path: &str,
        session: &SessionCookie,
        body: &T,
    ) -> Result<reqwest::blocking::Response, PortalError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(reqwest::header::COOKIE, session.header_value())
            .json(body)
            .send()?;
        check_status(response)
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, PortalError> {
    let status = response.status();
    if status.as_u16() == 401 {
        return Err(PortalError::SessionExpired);
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(PortalError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

impl Portal for PortalClient {
    fn identity(&self, session: &SessionCookie) -> Result<Identity, PortalError> {
        Ok(self.get("/api/device-agent/me", session)?.json()?)
    }

    fn my_organizations(&self, session: &SessionCookie) -> Result<Vec<Organization>, PortalError> {
        Ok(self
            .get("/api/device-agent/my-organizations", session)?
            .json()?)
    }

    fn register_device(
        &self,
        session: &SessionCookie,
        organization_id: &str,
        device: &DeviceInfo,
        agent_version: &str,
    ) -> Result<String, PortalError> {
        let request = RegisterRequest {
            device,
            agent_version,
            organization_id,
        };
        let response: RegisterResponse = self
            .post_json("/api/device-agent/register", session, &request)?
            .json()?;
        Ok(response.device_id)
    }

    fn check_in(
        &self,
        session: &SessionCookie,
        device_id: &str,
        checks: &[CheckResult],
        agent_version: &str,
    ) -> Result<CheckInResponse, PortalError> {
        let request = CheckInRequest {
            device_id,
            checks,
            agent_version,
        };
        Ok(self
            .post_json("/api/device-agent/check-in", session, &request)?
            .json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_uses_stored_name() {
        let plain = SessionCookie::new("portal_session", "abc");
        assert_eq!(plain.header_value(), "portal_session=abc");

        let secure = SessionCookie::new("__Secure-portal_session", "abc");
        assert_eq!(secure.header_value(), "__Secure-portal_session=abc");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = PortalClient::new("https://portal.example/").unwrap();
        assert_eq!(client.base_url(), "https://portal.example");
        assert_eq!(client.sign_in_url(), "https://portal.example/sign-in");
    }

    #[test]
    fn check_in_request_uses_wire_field_names() {
        let request = CheckInRequest {
            device_id: "dev-1",
            checks: &[],
            agent_version: "0.1.0",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["agentVersion"], "0.1.0");
        assert!(json["checks"].is_array());
    }
}
