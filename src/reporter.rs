use crate::core::{CheckResult, StoredAuth};
use crate::portal::{Portal, PortalError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    pub all_succeeded: bool,
    pub is_compliant: bool,
    pub session_expired: bool,
    pub failures: Vec<String>,
}

/// 登録済みの全組織へ順にチェック結果を送信する。401 が返った時点で
/// 残りの組織への送信は打ち切る（同じセッションで成功する見込みがないため）。
pub fn report<P: Portal + ?Sized>(
    portal: &P,
    auth: &StoredAuth,
    results: &[CheckResult],
    agent_version: &str,
) -> ReportOutcome {
    let session = crate::auth::session_cookie_from(auth);
    let mut outcome = ReportOutcome {
        all_succeeded: true,
        is_compliant: true,
        session_expired: false,
        failures: Vec::new(),
    };

    for org in &auth.orgs {
        match portal.check_in(&session, &org.device_id, results, agent_version) {
            Ok(response) => {
                if !response.is_compliant {
                    outcome.is_compliant = false;
                }
            }
            Err(PortalError::SessionExpired) => {
                outcome.all_succeeded = false;
                outcome.is_compliant = false;
                outcome.session_expired = true;
                outcome
                    .failures
                    .push(format!("{}: セッション切れ", org.organization_name));
                break;
            }
            Err(err) => {
                outcome.all_succeeded = false;
                outcome.is_compliant = false;
                outcome
                    .failures
                    .push(format!("{}: {err}", org.organization_name));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceInfo, OrgRegistration};
    use crate::portal::{CheckInResponse, Identity, Organization, SessionCookie};
    use std::cell::RefCell;

    struct FakePortal {
        // device_id → (status, is_compliant)
        responses: Vec<(String, Result<bool, u16>)>,
        calls: RefCell<Vec<String>>,
    }

    impl FakePortal {
        fn new(responses: &[(&str, Result<bool, u16>)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(id, r)| (id.to_string(), r.clone()))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Portal for FakePortal {
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
            device_id: &str,
            _checks: &[CheckResult],
            _agent_version: &str,
        ) -> Result<CheckInResponse, PortalError> {
            self.calls.borrow_mut().push(device_id.to_string());
            let (_, response) = self
                .responses
                .iter()
                .find(|(id, _)| id == device_id)
                .expect("未定義のデバイス ID");
            match response {
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

    fn auth_with_devices(device_ids: &[&str]) -> StoredAuth {
        StoredAuth {
            session_token: "tok".to_string(),
            cookie_name: "portal_session".to_string(),
            user_id: "user-1".to_string(),
            orgs: device_ids
                .iter()
                .enumerate()
                .map(|(i, id)| OrgRegistration {
                    organization_id: format!("org-{i}"),
                    organization_name: format!("Org {i}"),
                    device_id: id.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn all_compliant_reports_success() {
        let portal = FakePortal::new(&[("d1", Ok(true)), ("d2", Ok(true))]);
        let auth = auth_with_devices(&["d1", "d2"]);

        let outcome = report(&portal, &auth, &[], "0.1.0");

        assert!(outcome.all_succeeded);
        assert!(outcome.is_compliant);
        assert!(!outcome.session_expired);
        assert_eq!(*portal.calls.borrow(), vec!["d1", "d2"]);
    }

    #[test]
    fn any_noncompliant_org_makes_the_whole_report_noncompliant() {
        let portal = FakePortal::new(&[("d1", Ok(true)), ("d2", Ok(false))]);
        let auth = auth_with_devices(&["d1", "d2"]);

        let outcome = report(&portal, &auth, &[], "0.1.0");

        assert!(outcome.all_succeeded);
        assert!(!outcome.is_compliant);
    }

    #[test]
    fn session_expiry_halts_remaining_orgs() {
        let portal = FakePortal::new(&[("d1", Ok(true)), ("d2", Err(401)), ("d3", Ok(true))]);
        let auth = auth_with_devices(&["d1", "d2", "d3"]);

        let outcome = report(&portal, &auth, &[], "0.1.0");

        assert!(!outcome.all_succeeded);
        assert!(outcome.session_expired);
        assert_eq!(*portal.calls.borrow(), vec!["d1", "d2"]);
    }

    #[test]
    fn non_auth_failure_continues_with_remaining_orgs() {
        let portal = FakePortal::new(&[("d1", Err(503)), ("d2", Ok(true))]);
        let auth = auth_with_devices(&["d1", "d2"]);

        let outcome = report(&portal, &auth, &[], "0.1.0");

        assert!(!outcome.all_succeeded);
        assert!(!outcome.session_expired);
        assert!(!outcome.is_compliant);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(*portal.calls.borrow(), vec!["d1", "d2"]);
    }
}
