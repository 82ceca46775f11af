use anyhow::Result;

use crate::core::{DeviceInfo, OrgRegistration, StoredAuth};
use crate::portal::{COOKIE_NAMES, Portal, SessionCookie};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    NotStarted,
    AwaitingNavigation,
    Verifying,
    Registering,
    Complete,
    Cancelled,
    Failed(String),
}

impl LoginState {
    pub fn label(&self) -> &str {
        match self {
            Self::NotStarted => "未開始",
            Self::AwaitingNavigation => "サインイン待ち",
            Self::Verifying => "セッションを確認中",
            Self::Registering => "デバイスを登録中",
            Self::Complete => "完了",
            Self::Cancelled => "キャンセル",
            Self::Failed(_) => "失敗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Navigated { url: String },
    Closed,
}

pub trait SignInSurface {
    fn open(&mut self, url: &str) -> Result<()>;

    fn next_event(&mut self) -> Result<SurfaceEvent>;

    fn session_cookie(&mut self, names: &[&str]) -> Result<Option<SessionCookie>>;

    fn clear_session(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Completed {
        auth: StoredAuth,
        /// 登録に失敗してスキップした組織（組織名: 原因）
        skipped_orgs: Vec<String>,
    },
    Cancelled,
    Failed(String),
}

pub fn is_signed_in_url(portal_base_url: &str, url: &str) -> bool {
    let base = portal_base_url.trim_end_matches('/');
    let Some(rest) = url.strip_prefix(base) else {
        return false;
    };
    let path = rest.split(['?', '#']).next().unwrap_or("");
    if !path.is_empty() && !path.starts_with('/') {
        return false;
    }
    !path.starts_with("/sign-in") && !path.starts_with("/sign-up") && !path.starts_with("/api")
}

pub struct AuthManager<'a, P: Portal + ?Sized> {
    portal: &'a P,
    portal_base_url: &'a str,
}

impl<'a, P: Portal + ?Sized> AuthManager<'a, P> {
    pub fn new(portal: &'a P, portal_base_url: &'a str) -> Self {
        Self {
            portal,
            portal_base_url,
        }
    }

    pub fn login(
        &self,
        surface: &mut dyn SignInSurface,
        device: &DeviceInfo,
        agent_version: &str,
        mut on_state: impl FnMut(&LoginState),
    ) -> Result<LoginOutcome> {
        on_state(&LoginState::AwaitingNavigation);
        surface.open(&format!(
            "{}/sign-in",
            self.portal_base_url.trim_end_matches('/')
        ))?;

        let cookie = loop {
            match surface.next_event()? {
                SurfaceEvent::Closed => {
                    on_state(&LoginState::Cancelled);
                    return Ok(LoginOutcome::Cancelled);
                }
                SurfaceEvent::Navigated { url } => {
                    if !is_signed_in_url(self.portal_base_url, &url) {
                        continue;
                    }
                    // サインイン完了前の遷移ではクッキーがまだ無いことがある
                    match surface.session_cookie(&COOKIE_NAMES)? {
                        Some(cookie) => break cookie,
                        None => continue,
                    }
                }
            }
        };

        on_state(&LoginState::Verifying);
        let identity = match self.portal.identity(&cookie) {
            Ok(identity) => identity,
            Err(err) => {
                let message = format!("セッションの確認に失敗しました: {err}");
                on_state(&LoginState::Failed(message.clone()));
                return Ok(LoginOutcome::Failed(message));
            }
        };

        let organizations = match self.portal.my_organizations(&cookie) {
            Ok(organizations) => organizations,
            Err(err) => {
                let message = format!("組織一覧の取得に失敗しました: {err}");
                on_state(&LoginState::Failed(message.clone()));
                return Ok(LoginOutcome::Failed(message));
            }
        };

        if organizations.is_empty() {
            let message =
                "所属している組織がありません。組織の管理者に招待を依頼してください".to_string();
            on_state(&LoginState::Failed(message.clone()));
            return Ok(LoginOutcome::Failed(message));
        }

        on_state(&LoginState::Registering);
        let mut orgs = Vec::new();
        let mut skipped_orgs = Vec::new();
        for organization in &organizations {
            match self.portal.register_device(
                &cookie,
                &organization.organization_id,
                device,
                agent_version,
            ) {
                Ok(device_id) => orgs.push(OrgRegistration {
                    organization_id: organization.organization_id.clone(),
                    organization_name: organization.organization_name.clone(),
                    device_id,
                }),
                Err(err) => {
                    skipped_orgs.push(format!("{}: {err}", organization.organization_name));
                }
            }
        }

        if orgs.is_empty() {
            let message = format!(
                "デバイス登録に失敗しました（{} 組織すべてで失敗）: {}",
                organizations.len(),
                skipped_orgs.join("; ")
            );
            on_state(&LoginState::Failed(message.clone()));
            return Ok(LoginOutcome::Failed(message));
        }

        let auth = StoredAuth {
            session_token: cookie.value,
            cookie_name: cookie.name,
            user_id: identity.user_id,
            orgs,
        };
        on_state(&LoginState::Complete);
        Ok(LoginOutcome::Completed { auth, skipped_orgs })
    }

    pub fn logout(&self, store: &mut Store, surface: &mut dyn SignInSurface) -> Result<()> {
        surface.clear_session()?;
        store.clear_auth()
    }
}

pub fn session_cookie_from(auth: &StoredAuth) -> SessionCookie {
    SessionCookie::new(auth.cookie_name.clone(), auth.session_token.clone())
}
