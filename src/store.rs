use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{CheckResult, StoredAuth};

pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_auth: Option<StoredAuth>,
    #[serde(default)]
    pub last_results: Vec<CheckResult>,
    pub interval_secs: u64,
    pub portal_base_url: String,
}

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    state: AgentState,
}

impl Store {
    pub fn state_path(home_dir: &Path) -> PathBuf {
        home_dir.join(".config/complyd/state.json")
    }

    pub fn open(home_dir: &Path, portal_base_url: &str, default_interval_secs: u64) -> Result<Self> {
        Self::open_at(
            Self::state_path(home_dir),
            portal_base_url,
            default_interval_secs,
        )
    }

    pub fn open_at(
        path: PathBuf,
        portal_base_url: &str,
        default_interval_secs: u64,
    ) -> Result<Self> {
        let mut state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("状態ファイルの読み取りに失敗しました: {}", path.display()))?;
            serde_json::from_str::<AgentState>(&contents)
                .with_context(|| format!("状態ファイルの解析に失敗しました: {}", path.display()))?
        } else {
            AgentState {
                stored_auth: None,
                last_results: Vec::new(),
                interval_secs: default_interval_secs,
                portal_base_url: portal_base_url.to_string(),
            }
        };

        // 別環境のポータルで発行されたセッションを持ち越さない
        let mut dirty = false;
        if state.portal_base_url != portal_base_url {
            state.stored_auth = None;
            state.last_results = Vec::new();
            state.portal_base_url = portal_base_url.to_string();
            dirty = true;
        }

        let store = Self { path, state };
        if dirty {
            store.save()?;
        }
        Ok(store)
    }

    pub fn stored_auth(&self) -> Option<&StoredAuth> {
        self.state.stored_auth.as_ref()
    }

    pub fn set_auth(&mut self, auth: StoredAuth) -> Result<()> {
        self.state.stored_auth = Some(auth);
        self.save()
    }

    pub fn clear_auth(&mut self) -> Result<()> {
        if self.state.stored_auth.is_none() {
            return Ok(());
        }
        self.state.stored_auth = None;
        self.save()
    }

    pub fn last_results(&self) -> &[CheckResult] {
        &self.state.last_results
    }

    pub fn set_last_results(&mut self, results: Vec<CheckResult>) -> Result<()> {
        self.state.last_results = results;
        self.save()
    }

    pub fn interval_secs(&self) -> u64 {
        self.state.interval_secs
    }

    pub fn set_interval_secs(&mut self, interval_secs: u64) -> Result<()> {
        self.state.interval_secs = interval_secs;
        self.save()
    }

    pub fn portal_base_url(&self) -> &str {
        &self.state.portal_base_url
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("状態ディレクトリの作成に失敗しました: {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(&self.state)
            .context("状態のシリアライズに失敗しました")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("状態ファイルの書き込みに失敗しました: {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrgRegistration;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_state_path() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "complyd-store-test-{}-{seq}/state.json",
            std::process::id()
        ))
    }

    fn sample_auth() -> StoredAuth {
        StoredAuth {
            session_token: "tok".to_string(),
            cookie_name: "portal_session".to_string(),
            user_id: "user-1".to_string(),
            orgs: vec![OrgRegistration {
                organization_id: "org-1".to_string(),
                organization_name: "Org".to_string(),
                device_id: "dev-1".to_string(),
            }],
        }
    }

    #[test]
    fn auth_survives_reopen_with_same_portal() {
        let path = temp_state_path();
        let mut store =
            Store::open_at(path.clone(), "https://portal.example", DEFAULT_INTERVAL_SECS).unwrap();
        store.set_auth(sample_auth()).unwrap();

        let reopened =
            Store::open_at(path.clone(), "https://portal.example", DEFAULT_INTERVAL_SECS).unwrap();
        assert!(reopened.stored_auth().is_some());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn portal_mismatch_forces_auth_reset() {
        let path = temp_state_path();
        let mut store =
            Store::open_at(path.clone(), "https://portal.example", DEFAULT_INTERVAL_SECS).unwrap();
        store.set_auth(sample_auth()).unwrap();

        let reopened =
            Store::open_at(path.clone(), "https://staging.example", DEFAULT_INTERVAL_SECS).unwrap();
        assert!(reopened.stored_auth().is_none());
        assert_eq!(reopened.portal_base_url(), "https://staging.example");
        assert!(reopened.last_results().is_empty());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn clear_auth_is_idempotent() {
        let path = temp_state_path();
        let mut store =
            Store::open_at(path.clone(), "https://portal.example", DEFAULT_INTERVAL_SECS).unwrap();
        store.set_auth(sample_auth()).unwrap();

        store.clear_auth().unwrap();
        assert!(store.stored_auth().is_none());
        store.clear_auth().unwrap();
        assert!(store.stored_auth().is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_state_path();
        let mut store =
            Store::open_at(path.clone(), "https://portal.example", DEFAULT_INTERVAL_SECS).unwrap();
        store.set_auth(sample_auth()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
