use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgRegistration {
    pub organization_id: String,
    pub organization_name: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuth {
    pub session_token: String,
    pub cookie_name: String,
    pub user_id: String,
    pub orgs: Vec<OrgRegistration>,
}
