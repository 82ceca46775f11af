use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    InvalidArgs = 2,
    CheckFailed = 10,
    ExternalCommandFailed = 20,
    AuthRequired = 30,
}

impl ExitCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// プロセスの終了コードを運ぶラッパー。anyhow のチェーンを通って
/// main まで届き、downcast で取り出される。
#[derive(Debug)]
struct ExitError {
    code: ExitCode,
    err: anyhow::Error,
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.err.as_ref())
    }
}

fn wrap(code: ExitCode, err: anyhow::Error) -> anyhow::Error {
    ExitError { code, err }.into()
}

/// 終了コードの無いエラーは CheckFailed 扱い。
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ExitError>()
        .map_or(ExitCode::CheckFailed, |e| e.code)
        .code()
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    wrap(ExitCode::InvalidArgs, anyhow::anyhow!(message.into()))
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    wrap(ExitCode::InvalidArgs, err)
}

pub fn external_cmd(message: impl Into<String>) -> anyhow::Error {
    wrap(ExitCode::ExternalCommandFailed, anyhow::anyhow!(message.into()))
}

pub fn auth_required(message: impl Into<String>) -> anyhow::Error {
    wrap(ExitCode::AuthRequired, anyhow::anyhow!(message.into()))
}

pub fn check_failed(message: impl Into<String>) -> anyhow::Error {
    wrap(ExitCode::CheckFailed, anyhow::anyhow!(message.into()))
}
