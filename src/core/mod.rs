mod check;
mod device;
mod remediation;
mod session;

pub use check::{CheckDetails, CheckResult, CheckType};
pub use device::{DeviceInfo, Platform};
pub use remediation::{RemediationInfo, RemediationResult, RemediationType};
pub use session::{OrgRegistration, StoredAuth};
