use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Result;

use crate::auth::{SignInSurface, SurfaceEvent};
use crate::core::Platform;
use crate::portal::SessionCookie;

/// 端末でのサインイン。既定のブラウザでポータルを開き、サインイン完了後に
/// セッショントークンを貼り付けてもらう。
pub struct ConsoleSurface {
    platform: Platform,
    portal_base_url: String,
    timeout: Duration,
    token: Option<String>,
    quiet: bool,
}

impl ConsoleSurface {
    pub fn new(platform: Platform, portal_base_url: &str, timeout: Duration, quiet: bool) -> Self {
        Self {
            platform,
            portal_base_url: portal_base_url.trim_end_matches('/').to_string(),
            timeout,
            token: None,
            quiet,
        }
    }
}

impl SignInSurface for ConsoleSurface {
    fn open(&mut self, url: &str) -> Result<()> {
        if crate::platform::open_url(self.platform, url, self.timeout).is_err() && !self.quiet {
            eprintln!("ブラウザを自動で開けませんでした。次の URL を開いてください:");
        }
        if !self.quiet {
            eprintln!("  {url}");
        }
        Ok(())
    }

    fn next_event(&mut self) -> Result<SurfaceEvent> {
        let mut stderr = std::io::stderr().lock();
        write!(
            stderr,
            "サインイン完了後、ポータルのセッショントークンを貼り付けてください（中止は空行）: "
        )?;
        stderr.flush()?;

        let mut input = String::new();
        let n = std::io::stdin().lock().read_line(&mut input)?;
        let input = input.trim();
        if n == 0 || input.is_empty() {
            return Ok(SurfaceEvent::Closed);
        }

        self.token = Some(input.to_string());
        Ok(SurfaceEvent::Navigated {
            url: format!("{}/", self.portal_base_url),
        })
    }

    fn session_cookie(&mut self, names: &[&str]) -> Result<Option<SessionCookie>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };
        // "name=value" 形式ならクッキー名ごと受け付ける
        if let Some((name, value)) = token.split_once('=') {
            if names.contains(&name) {
                return Ok(Some(SessionCookie::new(name, value)));
            }
        }
        Ok(Some(SessionCookie::new(
            names.first().copied().unwrap_or("portal_session"),
            token.clone(),
        )))
    }

    fn clear_session(&mut self) -> Result<()> {
        self.token = None;
        Ok(())
    }
}
