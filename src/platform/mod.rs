use std::io::Read;
use std::path::PathBuf;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::core::{DeviceInfo, Platform};

pub mod linux;
pub mod macos;
pub mod windows;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// 外部コマンド 1 回分の実行計画。実行は常にタイムアウト付き。
pub struct CommandLine<'a> {
    program: &'a str,
    args: &'a [&'a str],
    timeout: Duration,
    env: Vec<(String, String)>,
    uid_gid: Option<(u32, u32)>,
}

impl<'a> CommandLine<'a> {
    pub fn new(program: &'a str, args: &'a [&'a str], timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
            env: Vec::new(),
            uid_gid: None,
        }
    }

    /// sudo 経由で起動された場合、元のユーザーの uid/gid と HOME で実行する。
    /// sudo でなければ何も変えない。
    pub fn as_invoking_user(mut self) -> Self {
        let Some(user) = invoking_user() else {
            return self;
        };
        self.uid_gid = Some((user.uid, user.gid));
        self.env
            .push(("HOME".to_string(), user.home_dir.display().to_string()));
        if let Some(name) = user.username {
            self.env.push(("USER".to_string(), name.clone()));
            self.env.push(("LOGNAME".to_string(), name));
        }
        self
    }

    pub fn run(self) -> Result<CommandOutput> {
        let mut command = Command::new(self.program);
        command.args(self.args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        for (key, value) in &self.env {
            command.env(key, value);
        }

        #[cfg(unix)]
        if let Some((uid, gid)) = self.uid_gid {
            use std::os::unix::process::CommandExt;
            command.uid(uid);
            command.gid(gid);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("コマンドを起動できませんでした: {}", self.program))?;

        // パイプが詰まらないよう、待機と並行して読み切る
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain(stdout_pipe));
        let stderr_reader = thread::spawn(move || drain_err(stderr_pipe));

        let status = child
            .wait_timeout(self.timeout)
            .with_context(|| format!("コマンドの終了待ちに失敗しました: {}", self.program))?;
        let status = match status {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "コマンドがタイムアウトしました（{} 秒）: {}",
                    self.timeout.as_secs(),
                    self.program
                ));
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

fn drain(pipe: Option<ChildStdout>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

fn drain_err(pipe: Option<ChildStderr>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    CommandLine::new(program, args, timeout).run()
}

pub fn run_command_invoking_user(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput> {
    CommandLine::new(program, args, timeout)
        .as_invoking_user()
        .run()
}

struct InvokingUser {
    uid: u32,
    gid: u32,
    username: Option<String>,
    home_dir: PathBuf,
}

fn invoking_user() -> Option<InvokingUser> {
    let uid = std::env::var("SUDO_UID").ok()?.parse::<u32>().ok()?;
    let gid = std::env::var("SUDO_GID").ok()?.parse::<u32>().ok()?;
    Some(InvokingUser {
        uid,
        gid,
        username: std::env::var("SUDO_USER").ok(),
        home_dir: home_dir_for_uid(uid)?,
    })
}

/// エージェントの設定・状態ディレクトリの基点。sudo 下では呼び出し元
/// ユーザーのホームを使う。
pub fn effective_home_dir() -> Result<PathBuf> {
    if let Some(user) = invoking_user() {
        return Ok(user.home_dir);
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(profile));
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("環境変数 HOME が設定されていません"))
}

#[cfg(unix)]
fn home_dir_for_uid(uid: u32) -> Option<PathBuf> {
    use std::ffi::CStr;

    let mut buf = vec![0u8; 1024];
    loop {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };

        if rc == libc::ERANGE && buf.len() < 1024 * 1024 {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
            return None;
        }

        let dir = unsafe { CStr::from_ptr(pwd.pw_dir) }
            .to_string_lossy()
            .to_string();
        return (!dir.trim().is_empty()).then(|| PathBuf::from(dir));
    }
}

#[cfg(not(unix))]
fn home_dir_for_uid(_uid: u32) -> Option<PathBuf> {
    None
}

pub fn hostname(timeout: Duration) -> String {
    if let Ok(out) = run_command("hostname", &[], timeout) {
        let name = out.stdout.trim();
        if out.exit_code == 0 && !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn device_info(platform: Platform, timeout: Duration) -> DeviceInfo {
    let hostname = hostname(timeout);
    match platform {
        Platform::Macos => macos::device_info(&hostname, timeout),
        Platform::Linux => linux::device_info(&hostname, timeout),
        Platform::Windows => windows::device_info(&hostname, timeout),
    }
}

pub fn open_url(platform: Platform, url: &str, timeout: Duration) -> Result<()> {
    let out = match platform {
        Platform::Macos => run_command("open", &[url], timeout)?,
        Platform::Linux => run_command("xdg-open", &[url], timeout)?,
        Platform::Windows => run_command("cmd", &["/C", "start", "", url], timeout)?,
    };
    if out.exit_code != 0 {
        return Err(anyhow!(
            "URL を開けませんでした（exit_code={}）: {url}",
            out.exit_code
        ));
    }
    Ok(())
}
