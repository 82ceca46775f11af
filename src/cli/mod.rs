use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;

use crate::agent::Agent;
use crate::auth::LoginOutcome;
use crate::core::{CheckType, Platform};
use crate::portal::PortalClient;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::ui::UiConfig;

mod console;

#[derive(Debug, Parser)]
#[command(
    name = "complyd",
    version,
    about = "エンドポイントのコンプライアンス状態をチェックし、修復とポータルへの報告を行うエージェント"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Status(StatusArgs),
    Login(LoginArgs),
    Logout(LogoutArgs),
    Check(CheckArgs),
    Agent(AgentArgs),
    Remediate(RemediateArgs),
    Device(DeviceArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {}

#[derive(Debug, Args)]
pub struct LoginArgs {}

#[derive(Debug, Args)]
pub struct LogoutArgs {}

#[derive(Debug, Args)]
pub struct CheckArgs {}

#[derive(Debug, Args)]
pub struct AgentArgs {
    #[arg(long)]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct RemediateArgs {
    pub check: String,
    #[arg(long)]
    pub info: bool,
}

#[derive(Debug, Args)]
pub struct DeviceArgs {}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("COMPLYD_CONFIG").map(PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args(
                "--timeout には 1 以上を指定してください",
            ));
        }
        cfg.checks.timeout_secs = timeout;
    }

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;
    let ui_cfg = UiConfig {
        color,
        stdout_is_tty,
        stderr_is_tty,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    if let Commands::Completion(args) = &cli.command {
        let shell = parse_shell(&args.shell)?;
        let mut cmd = Cli::command();
        let mut out = std::io::stdout().lock();
        clap_complete::generate(shell, &mut cmd, "complyd", &mut out);
        return Ok(());
    }

    if let Commands::Config(args) = &cli.command {
        if args.show {
            if cli.json {
                let stdout = std::io::stdout();
                serde_json::to_writer_pretty(stdout.lock(), &cfg)?;
                println!();
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        } else if !ui_cfg.quiet {
            eprintln!("config: `complyd config --show` を使用してください");
        }
        return Ok(());
    }

    let platform = Platform::current()
        .ok_or_else(|| crate::exit::invalid_args("未対応のプラットフォームです"))?;

    let store = Store::open(&home_dir, &cfg.portal.base_url, cfg.agent.interval_secs)?;
    let portal = PortalClient::new(&cfg.portal.base_url)?;
    let agent = Agent::new(
        cfg.clone(),
        platform,
        portal,
        Arc::new(Mutex::new(store)),
        home_dir.clone(),
    );

    match cli.command {
        Commands::Status(_args) => {
            let auth = agent.stored_auth()?;
            let last_results = agent.last_results()?;
            let interval_secs = agent.interval()?.as_secs();
            if cli.json {
                write_json(&status_json(
                    &cfg.portal.base_url,
                    auth.as_ref(),
                    interval_secs,
                    &last_results,
                ))?;
            } else {
                crate::ui::print_status(
                    auth.as_ref(),
                    &last_results,
                    interval_secs,
                    &cfg.portal.base_url,
                    &ui_cfg,
                );
            }
        }
        Commands::Login(_args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("login は --json と併用できません"));
            }
            if !(stdin_is_tty && stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "login は TTY が必要です（stdin + stdout）",
                ));
            }

            let mut surface = console::ConsoleSurface::new(
                platform,
                &cfg.portal.base_url,
                Duration::from_secs(cfg.checks.timeout_secs),
                ui_cfg.quiet,
            );
            let outcome = agent.login(&mut surface, |state| {
                if !ui_cfg.quiet {
                    eprintln!("状態: {}", state.label());
                }
            })?;

            match outcome {
                LoginOutcome::Completed { auth, skipped_orgs } => {
                    for entry in &skipped_orgs {
                        eprintln!("登録をスキップしました: {entry}");
                    }
                    if !ui_cfg.quiet {
                        println!("ログインしました（ユーザー: {}）", auth.user_id);
                        for org in &auth.orgs {
                            println!(
                                "  組織: {}（デバイス ID: {}）",
                                org.organization_name, org.device_id
                            );
                        }
                    }
                }
                LoginOutcome::Cancelled => {
                    if !ui_cfg.quiet {
                        eprintln!("キャンセルしました。");
                    }
                }
                LoginOutcome::Failed(message) => {
                    return Err(crate::exit::auth_required(message));
                }
            }
        }
        Commands::Logout(_args) => {
            let mut surface = console::ConsoleSurface::new(
                platform,
                &cfg.portal.base_url,
                Duration::from_secs(cfg.checks.timeout_secs),
                ui_cfg.quiet,
            );
            agent.logout(&mut surface)?;
            if !ui_cfg.quiet {
                println!("ログアウトしました。");
            }
        }
        Commands::Check(_args) => {
            let progress_enabled = ui_cfg.stderr_is_tty && !cli.quiet && !cli.json;
            let pb = if progress_enabled {
                let pb = indicatif::ProgressBar::new_spinner();
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_message("チェックを実行中...");
                pb.enable_steady_tick(Duration::from_millis(120));
                Some(pb)
            } else {
                None
            };

            let cycle = agent.run_checks_now();

            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let cycle = cycle?;

            if cli.json {
                write_json(&cycle_json(&cycle))?;
            } else {
                crate::ui::print_check_results(&cycle.results, &ui_cfg);
                if let Some(report) = &cycle.report {
                    crate::ui::print_report_outcome(report, &ui_cfg);
                }
            }

            if cycle.report.as_ref().is_some_and(|r| r.session_expired) {
                return Err(crate::exit::auth_required(
                    "セッションが失効しています。`complyd login` で再ログインしてください",
                ));
            }
            if cycle.results.iter().any(|r| !r.passed) {
                return Err(crate::exit::check_failed(
                    "基準を満たしていないチェック項目があります",
                ));
            }
        }
        Commands::Agent(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("agent は --json と併用できません"));
            }
            if agent.stored_auth()?.is_none() {
                return Err(crate::exit::auth_required(
                    "ログインしていません。`complyd login` を実行してください",
                ));
            }

            let interval = match args.interval {
                Some(0) => {
                    return Err(crate::exit::invalid_args(
                        "--interval には 1 以上を指定してください",
                    ));
                }
                Some(secs) => Duration::from_secs(secs),
                None => agent.interval()?,
            };

            let agent = Arc::new(agent);
            let quiet = ui_cfg.quiet;
            let (expired_tx, expired_rx) = std::sync::mpsc::channel::<()>();

            let mut scheduler = Scheduler::new();
            scheduler.start(
                Arc::clone(&agent) as Arc<dyn crate::scheduler::CycleRunner>,
                interval,
                Arc::new(move |results, is_compliant| {
                    println!(
                        "{}",
                        serde_json::json!({
                            "event": "check-results-updated",
                            "results": results,
                            "isCompliant": is_compliant,
                        })
                    );
                    if !quiet {
                        let passed = results.iter().filter(|r| r.passed).count();
                        eprintln!(
                            "チェックサイクル完了: 合格 {passed} / {}",
                            results.len()
                        );
                    }
                }),
                Arc::new(move || {
                    let _ = expired_tx.send(());
                }),
            )?;

            if !ui_cfg.quiet {
                eprintln!(
                    "エージェントを開始しました（間隔: {} 秒）。停止は Ctrl+C",
                    interval.as_secs()
                );
            }

            // セッション失効までは動き続ける
            let _ = expired_rx.recv();
            println!(
                "{}",
                serde_json::json!({
                    "event": "auth-state-changed",
                    "authenticated": false,
                })
            );
            scheduler.stop();
            return Err(crate::exit::auth_required(
                "セッションが失効したためエージェントを停止しました。`complyd login` で再ログインしてください",
            ));
        }
        Commands::Remediate(args) => {
            let check_type: CheckType = args
                .check
                .parse()
                .map_err(crate::exit::invalid_args)?;

            if args.info {
                let Some(info) = agent.remediation_info(check_type) else {
                    return Err(crate::exit::invalid_args(format!(
                        "この環境には {} の修復手段が定義されていません",
                        check_type.display_name()
                    )));
                };
                if cli.json {
                    write_json(&info)?;
                } else {
                    crate::ui::print_remediation_info(&info, &ui_cfg);
                }
                return Ok(());
            }

            let outcome = agent.remediate(check_type)?;

            if cli.json {
                write_json(&serde_json::json!({
                    "checkType": check_type,
                    "info": outcome.info,
                    "result": outcome.result,
                    "recheck": outcome.recheck.as_ref().map(cycle_json),
                }))?;
            } else {
                crate::ui::print_remediation_outcome(&outcome, &ui_cfg);
            }

            if !outcome.result.success {
                return Err(crate::exit::external_cmd(outcome.result.message));
            }
        }
        Commands::Device(_args) => {
            let device = agent.device_info();
            if cli.json {
                write_json(&device)?;
            } else {
                crate::ui::print_device_info(&device, &ui_cfg);
            }
        }
        Commands::Config(_) | Commands::Completion(_) => unreachable!(),
    }

    Ok(())
}

fn status_json(
    portal_base_url: &str,
    auth: Option<&crate::core::StoredAuth>,
    interval_secs: u64,
    last_results: &[crate::core::CheckResult],
) -> serde_json::Value {
    serde_json::json!({
        "portalBaseUrl": portal_base_url,
        "loggedIn": auth.is_some(),
        // セッショントークンとクッキー名は出力しない
        "auth": auth.map(|auth| serde_json::json!({
            "userId": auth.user_id,
            "orgs": auth.orgs,
        })),
        "intervalSecs": interval_secs,
        "lastResults": last_results,
    })
}

fn cycle_json(cycle: &crate::agent::CycleReport) -> serde_json::Value {
    serde_json::json!({
        "results": cycle.results,
        "report": cycle.report.as_ref().map(|r| serde_json::json!({
            "allSucceeded": r.all_succeeded,
            "isCompliant": r.is_compliant,
            "sessionExpired": r.session_expired,
            "failures": r.failures,
        })),
    })
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        "powershell" => Ok(clap_complete::Shell::PowerShell),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish|powershell を指定してください）"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn remediate_rejects_unknown_check_names() {
        let cli = Cli::try_parse_from(["complyd", "remediate", "firewall"]).unwrap();
        let Commands::Remediate(args) = cli.command else {
            panic!("remediate になるはず");
        };
        assert!(args.check.parse::<CheckType>().is_err());
    }

    #[test]
    fn status_json_redacts_the_session_token() {
        use crate::core::{OrgRegistration, StoredAuth};

        let auth = StoredAuth {
            session_token: "tok-secret-123".to_string(),
            cookie_name: "portal_session".to_string(),
            user_id: "user-1".to_string(),
            orgs: vec![OrgRegistration {
                organization_id: "org-1".to_string(),
                organization_name: "Org".to_string(),
                device_id: "dev-1".to_string(),
            }],
        };

        let value = status_json("https://portal.example", Some(&auth), 3600, &[]);
        let rendered = value.to_string();
        assert!(!rendered.contains("tok-secret-123"), "{rendered}");
        assert!(!rendered.contains("sessionToken"), "{rendered}");
        assert_eq!(value["loggedIn"], true);
        assert_eq!(value["auth"]["userId"], "user-1");
        assert_eq!(value["auth"]["orgs"][0]["deviceId"], "dev-1");
    }

    #[test]
    fn parse_shell_accepts_supported_shells() {
        assert!(parse_shell("zsh").is_ok());
        assert!(parse_shell("PowerShell").is_ok());
        assert!(parse_shell("tcsh").is_err());
    }
}
