use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_INTERVAL_SECS;

pub const DEFAULT_PORTAL_BASE_URL: &str = "https://console.complyd.app";
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub portal: PortalConfig,
    pub agent: AgentConfig,
    pub checks: ChecksConfig,
    pub ui: UiConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecksConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig {
                base_url: DEFAULT_PORTAL_BASE_URL.to_string(),
            },
            agent: AgentConfig {
                interval_secs: DEFAULT_INTERVAL_SECS,
            },
            checks: ChecksConfig {
                timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            },
            ui: UiConfig { color: true },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    portal: Option<RawPortalConfig>,
    agent: Option<RawAgentConfig>,
    checks: Option<RawChecksConfig>,
    ui: Option<RawUiConfig>,
}

#[derive(Debug, Deserialize)]
struct RawPortalConfig {
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAgentConfig {
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawChecksConfig {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/complyd/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    if cfg.agent.interval_secs == 0 {
        anyhow::bail!("agent.interval_secs には 1 以上を指定してください");
    }
    if cfg.checks.timeout_secs == 0 {
        anyhow::bail!("checks.timeout_secs には 1 以上を指定してください");
    }

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(portal) = raw.portal {
        if let Some(base_url) = portal.base_url {
            cfg.portal.base_url = base_url;
        }
    }

    if let Some(agent) = raw.agent {
        if let Some(interval_secs) = agent.interval_secs {
            cfg.agent.interval_secs = interval_secs;
        }
    }

    if let Some(checks) = raw.checks {
        if let Some(timeout_secs) = checks.timeout_secs {
            cfg.checks.timeout_secs = timeout_secs;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("COMPLYD_PORTAL_BASE_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.portal.base_url = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("COMPLYD_AGENT_INTERVAL_SECS") {
        cfg.agent.interval_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "COMPLYD_AGENT_INTERVAL_SECS")?;
    }
    if let Ok(v) = std::env::var("COMPLYD_CHECKS_TIMEOUT_SECS") {
        cfg.checks.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "COMPLYD_CHECKS_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("COMPLYD_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "COMPLYD_UI_COLOR")?;
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}
