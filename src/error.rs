use std::path::PathBuf;
use thiserror::Error;

/// 操作员输入缺失或不合法，在任何步骤执行前报出
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("'{0}' is not a valid domain name")]
    InvalidDomain(String),
    #[error("'{0}' is not a valid upstream address (expected http:// or https://)")]
    InvalidUpstream(String),
    #[error("invalid selection '{value}' for {field}")]
    InvalidChoice { field: &'static str, value: String },
    #[error("{0} was not supplied and prompting is disabled")]
    MissingInput(&'static str),
    #[error("{field} path does not exist: {}", .path.display())]
    PathNotFound { field: &'static str, path: PathBuf },
    #[error("failed to read operator input: {0}")]
    Io(#[from] std::io::Error),
}

/// 外部命令执行失败
#[derive(Debug, Error)]
#[error("step '{description}' failed ({})", exit_label(.exit_status))]
pub struct StepError {
    pub description: String,
    /// 进程无法启动或被信号终止时为 `None`
    pub exit_status: Option<i32>,
    pub stderr: String,
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status".to_string(),
    }
}

#[derive(Debug, Error)]
pub enum CertError {
    #[error("{what} not found at {}", .path.display())]
    NotFound { what: &'static str, path: PathBuf },
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
    #[error("web server configuration check failed; {} left in place for inspection: {stderr}", .path.display())]
    ConfigInvalid { path: PathBuf, stderr: String },
    #[error("certificate storage error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("unrecognized firewall profile '{0}' (expected full, http, https or none)")]
    InvalidProfile(String),
}

/// 终止整个运行的错误
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Cert(#[from] CertError),
    #[error(transparent)]
    Firewall(#[from] FirewallError),
}

impl ProvisionError {
    /// 该错误类别对应的进程退出码
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::Validation(_) => 2,
            ProvisionError::Step(_) => 3,
            ProvisionError::Cert(_) => 4,
            ProvisionError::Firewall(_) => 5,
        }
    }
}
