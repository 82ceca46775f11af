use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use time::OffsetDateTime;

use crate::auth::{AuthManager, LoginOutcome, LoginState, SignInSurface};
use crate::checks::{CheckContext, CheckProvider, providers_for, run_provider_set};
use crate::config::EffectiveConfig;
use crate::core::{
    CheckResult, CheckType, DeviceInfo, Platform, RemediationInfo, RemediationResult, StoredAuth,
};
use crate::portal::Portal;
use crate::remediations::{RemediationContext, provider_for};
use crate::reporter::{ReportOutcome, report};
use crate::scheduler::{CycleRunner, CycleStatus};
use crate::store::Store;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// 自動修復の反映を待ってから再チェックするまでの時間
const RECHECK_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct CycleReport {
    pub results: Vec<CheckResult>,
    pub report: Option<ReportOutcome>,
}

#[derive(Debug)]
pub struct RemediationOutcome {
    pub info: Option<RemediationInfo>,
    pub result: RemediationResult,
    pub recheck: Option<CycleReport>,
}

pub struct Agent<P: Portal> {
    config: EffectiveConfig,
    platform: Platform,
    portal: P,
    store: Arc<Mutex<Store>>,
    home_dir: PathBuf,
    check_providers: &'static [CheckProvider],
}

impl<P: Portal> Agent<P> {
    pub fn new(
        config: EffectiveConfig,
        platform: Platform,
        portal: P,
        store: Arc<Mutex<Store>>,
        home_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            platform,
            portal,
            store,
            home_dir,
            check_providers: providers_for(platform),
        }
    }

    pub fn with_check_providers(mut self, providers: &'static [CheckProvider]) -> Self {
        self.check_providers = providers;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.config.checks.timeout_secs)
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| anyhow!("内部状態のロックに失敗しました"))
    }

    pub fn stored_auth(&self) -> Result<Option<StoredAuth>> {
        Ok(self.lock_store()?.stored_auth().cloned())
    }

    pub fn last_results(&self) -> Result<Vec<CheckResult>> {
        Ok(self.lock_store()?.last_results().to_vec())
    }

    pub fn interval(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.lock_store()?.interval_secs()))
    }

    pub fn device_info(&self) -> DeviceInfo {
        crate::platform::device_info(self.platform, self.check_timeout())
    }

    pub fn login(
        &self,
        surface: &mut dyn SignInSurface,
        on_state: impl FnMut(&LoginState),
    ) -> Result<LoginOutcome> {
        let device = self.device_info();
        let manager = AuthManager::new(&self.portal, &self.config.portal.base_url);
        let outcome = manager.login(surface, &device, AGENT_VERSION, on_state)?;
        if let LoginOutcome::Completed { auth, .. } = &outcome {
            self.lock_store()?.set_auth(auth.clone())?;
        }
        Ok(outcome)
    }

    pub fn logout(&self, surface: &mut dyn SignInSurface) -> Result<()> {
        let manager = AuthManager::new(&self.portal, &self.config.portal.base_url);
        let mut store = self.lock_store()?;
        manager.logout(&mut store, surface)
    }

    /// チェックを全件実行し、ログイン済みなら全組織へ結果を送信する。
    pub fn run_checks_now(&self) -> Result<CycleReport> {
        let started_at = OffsetDateTime::now_utc();
        let ctx = CheckContext::new(self.check_timeout(), self.home_dir.clone());
        let results = run_provider_set(self.check_providers, &ctx);

        let auth = self.stored_auth()?;
        let outcome = auth
            .as_ref()
            .map(|auth| report(&self.portal, auth, &results, AGENT_VERSION));

        self.lock_store()?.set_last_results(results.clone())?;

        // 失効が確認されたセッションは破棄する
        if outcome.as_ref().is_some_and(|o| o.session_expired) {
            self.lock_store()?.clear_auth()?;
        }

        let finished_at = OffsetDateTime::now_utc();
        if let Err(err) = crate::logs::write_check_cycle_log(
            &self.home_dir,
            started_at,
            finished_at,
            &results,
            outcome.as_ref(),
        ) {
            eprintln!("警告: チェックログを書き込めませんでした: {err:#}");
        }

        Ok(CycleReport {
            results,
            report: outcome,
        })
    }

    pub fn remediation_info(&self, check_type: CheckType) -> Option<RemediationInfo> {
        provider_for(self.platform, check_type).map(|provider| (provider.info)())
    }

    pub fn remediate(&self, check_type: CheckType) -> Result<RemediationOutcome> {
        let Some(provider) = provider_for(self.platform, check_type) else {
            return Ok(RemediationOutcome {
                info: None,
                result: RemediationResult::failed(format!(
                    "この環境には {} の修復手段が定義されていません",
                    check_type.display_name()
                )),
                recheck: None,
            });
        };

        let info = (provider.info)();
        let ctx = RemediationContext::new(self.check_timeout(), self.home_dir.clone());
        let started_at = OffsetDateTime::now_utc();
        let result = (provider.run)(&ctx);
        let finished_at = OffsetDateTime::now_utc();

        if let Err(err) = crate::logs::write_remediation_log(
            &self.home_dir,
            started_at,
            finished_at,
            check_type,
            info.remediation_type,
            &result,
        ) {
            eprintln!("警告: 修復ログを書き込めませんでした: {err:#}");
        }

        // 設定画面を開いただけの場合は状態が変わっていないので再チェックしない
        let recheck = if result.success && result.opened_settings.is_none() {
            std::thread::sleep(RECHECK_SETTLE);
            Some(self.run_checks_now()?)
        } else {
            None
        };

        Ok(RemediationOutcome {
            info: Some(info),
            result,
            recheck,
        })
    }
}

fn cycle_failure_results(err: &anyhow::Error) -> Vec<CheckResult> {
    CheckType::ALL
        .iter()
        .map(|check_type| {
            CheckResult::undetermined(
                *check_type,
                format!("チェックサイクルの実行に失敗しました: {err:#}"),
            )
        })
        .collect()
}

impl<P: Portal + Send + Sync + 'static> CycleRunner for Agent<P> {
    fn run_cycle(&self) -> CycleStatus {
        match self.stored_auth() {
            Ok(Some(_)) => {}
            Ok(None) => return CycleStatus::Skipped,
            Err(err) => return CycleStatus::Completed(cycle_failure_results(&err)),
        }

        match self.run_checks_now() {
            Ok(cycle) => {
                if cycle
                    .report
                    .as_ref()
                    .is_some_and(|report| report.session_expired)
                {
                    CycleStatus::SessionExpired
                } else {
                    CycleStatus::Completed(cycle.results)
                }
            }
            Err(err) => CycleStatus::Completed(cycle_failure_results(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Probe, ProbeOutcome};
    use crate::core::OrgRegistration;
    use crate::portal::{
        CheckInResponse, Identity, Organization, PortalError, SessionCookie,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    fn static_pass(_ctx: &CheckContext) -> Result<Option<ProbeOutcome>> {
        Ok(Some(ProbeOutcome::pass("raw", "ok")))
    }

    static PASS_PROBES: [Probe; 1] = [Probe {
        method: "static",
        run: static_pass,
    }];
    static TEST_PROVIDERS: [CheckProvider; 1] = [CheckProvider {
        check_type: CheckType::ScreenLock,
        probes: &PASS_PROBES,
    }];

    struct StubPortal {
        check_in_response: Result<bool, u16>,
    }

    impl Portal for StubPortal {
        fn identity(&self, _session: &SessionCookie) -> Result<Identity, PortalError> {
            unimplemented!()
        }

        fn my_organizations(
            &self,
            _session: &SessionCookie,
        ) -> Result<Vec<Organization>, PortalError> {
            unimplemented!()
        }

        fn register_device(
            &self,
            _session: &SessionCookie,
            _organization_id: &str,
            _device: &DeviceInfo,
            _agent_version: &str,
        ) -> Result<String, PortalError> {
            unimplemented!()
        }

        fn check_in(
            &self,
            _session: &SessionCookie,
            _device_id: &str,
            _checks: &[CheckResult],
            _agent_version: &str,
        ) -> Result<CheckInResponse, PortalError> {
            match &self.check_in_response {
                Ok(is_compliant) => Ok(CheckInResponse {
                    is_compliant: *is_compliant,
                    next_check_in: None,
                }),
                Err(401) => Err(PortalError::SessionExpired),
                Err(status) => Err(PortalError::Status {
                    status: *status,
                    body: String::new(),
                }),
            }
        }
    }

    fn temp_home() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "complyd-agent-test-{}-{seq}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn agent_with(portal: StubPortal, home: &PathBuf, auth: Option<StoredAuth>) -> Agent<StubPortal> {
        let mut store = Store::open_at(
            home.join("state.json"),
            "https://portal.example",
            3600,
        )
        .unwrap();
        if let Some(auth) = auth {
            store.set_auth(auth).unwrap();
        }
        Agent::new(
            EffectiveConfig::default(),
            Platform::Linux,
            portal,
            Arc::new(Mutex::new(store)),
            home.clone(),
        )
        .with_check_providers(&TEST_PROVIDERS)
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
    fn cycle_without_auth_is_skipped() {
        let home = temp_home();
        let agent = agent_with(
            StubPortal {
                check_in_response: Ok(true),
            },
            &home,
            None,
        );

        assert!(matches!(agent.run_cycle(), CycleStatus::Skipped));

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn cycle_persists_results_and_completes() {
        let home = temp_home();
        let agent = agent_with(
            StubPortal {
                check_in_response: Ok(true),
            },
            &home,
            Some(sample_auth()),
        );

        let CycleStatus::Completed(results) = agent.run_cycle() else {
            panic!("完了になるはず");
        };
        assert_eq!(results.len(), 1);
        assert!(results[0].passed);
        assert_eq!(agent.last_results().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn session_expiry_surfaces_from_cycle() {
        let home = temp_home();
        let agent = agent_with(
            StubPortal {
                check_in_response: Err(401),
            },
            &home,
            Some(sample_auth()),
        );

        assert!(matches!(agent.run_cycle(), CycleStatus::SessionExpired));
        // 失効したセッションは破棄され、次のサイクルはスキップになる
        assert!(agent.stored_auth().unwrap().is_none());
        assert!(matches!(agent.run_cycle(), CycleStatus::Skipped));

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn report_failure_still_persists_results() {
        let home = temp_home();
        let agent = agent_with(
            StubPortal {
                check_in_response: Err(503),
            },
            &home,
            Some(sample_auth()),
        );

        let cycle = agent.run_checks_now().unwrap();
        let report = cycle.report.unwrap();
        assert!(!report.all_succeeded);
        assert!(!report.session_expired);
        assert_eq!(agent.last_results().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn cycle_failure_results_cover_every_check() {
        let results = cycle_failure_results(&anyhow!("boom"));
        assert_eq!(results.len(), CheckType::ALL.len());
        assert!(results.iter().all(|r| !r.passed));
        assert!(results.iter().all(|r| r.details.message.contains("boom")));
    }
}
