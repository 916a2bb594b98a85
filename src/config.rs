use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::firewall::FirewallProfile;

const DOMAIN_PATTERN: &str =
    r"^(?i)[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$";
const UPSTREAM_PATTERN: &str = r"^https?://[^\s/?#]+(?:[/?#]\S*)?$";

/// 证书获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStrategy {
    /// 复制已有的证书和私钥文件
    ExistingFiles,
    /// 粘贴PEM文本
    PastedData,
    /// 通过ACME客户端签发
    Acme,
}

impl FromStr for CertificateStrategy {
    type Err = ValidationError;

    /// 接受菜单编号（1-3）或名称
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "existing" | "existing-files" | "files" => Ok(Self::ExistingFiles),
            "2" | "pasted" | "paste" | "pasted-data" => Ok(Self::PastedData),
            "3" | "acme" | "certbot" | "letsencrypt" => Ok(Self::Acme),
            _ => Err(ValidationError::InvalidChoice {
                field: "certificate strategy",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CertificateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExistingFiles => "existing files",
            Self::PastedData => "pasted PEM data",
            Self::Acme => "ACME (certbot)",
        };
        f.write_str(name)
    }
}

/// 证书来源及其携带的数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    ExistingFiles { cert_path: PathBuf, key_path: PathBuf },
    PastedData { cert_pem: String, key_pem: String },
    Acme { email: Option<String> },
}

impl CertificateSource {
    pub fn strategy(&self) -> CertificateStrategy {
        match self {
            Self::ExistingFiles { .. } => CertificateStrategy::ExistingFiles,
            Self::PastedData { .. } => CertificateStrategy::PastedData,
            Self::Acme { .. } => CertificateStrategy::Acme,
        }
    }
}

/// 一次配置运行的全部参数
///
/// 只能通过 [`ProvisioningRequest::new`] 构造，构造时完成校验；
/// 构造完成后不再提供修改接口。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    domain: String,
    upstream: String,
    include_www: bool,
    install_vpn: bool,
    vpn_auth_key: Option<String>,
    firewall: FirewallProfile,
    certificate: CertificateSource,
}

impl ProvisioningRequest {
    /// 校验并创建请求
    ///
    /// # 返回值
    /// 域名或上游地址为空、格式错误，或已有证书文件不存在时返回 `ValidationError`
    pub fn new(
        domain: &str,
        upstream: &str,
        firewall: FirewallProfile,
        certificate: CertificateSource,
    ) -> Result<Self, ValidationError> {
        let domain = validate_domain(domain)?;
        let upstream = validate_upstream(upstream)?;

        if let CertificateSource::ExistingFiles { cert_path, key_path } = &certificate {
            require_file("certificate", cert_path)?;
            require_file("private key", key_path)?;
        }

        Ok(Self {
            domain,
            upstream,
            include_www: true,
            install_vpn: false,
            vpn_auth_key: None,
            firewall,
            certificate,
        })
    }

    pub fn with_www(mut self, include_www: bool) -> Self {
        self.include_www = include_www;
        self
    }

    pub fn with_vpn(mut self, install_vpn: bool, auth_key: Option<String>) -> Self {
        self.install_vpn = install_vpn;
        self.vpn_auth_key = auth_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn include_www(&self) -> bool {
        self.include_www
    }

    pub fn install_vpn(&self) -> bool {
        self.install_vpn
    }

    pub fn vpn_auth_key(&self) -> Option<&str> {
        self.vpn_auth_key.as_deref()
    }

    pub fn firewall(&self) -> FirewallProfile {
        self.firewall
    }

    pub fn certificate(&self) -> &CertificateSource {
        &self.certificate
    }

    /// 虚拟主机匹配的全部主机名
    pub fn server_names(&self) -> Vec<String> {
        let mut names = vec![self.domain.clone()];
        if self.include_www && !self.domain.starts_with("www.") {
            names.push(format!("www.{}", self.domain));
        }
        names
    }
}

fn validate_domain(raw: &str) -> Result<String, ValidationError> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(ValidationError::EmptyField("domain"));
    }
    let valid = domain.len() <= 253
        && Regex::new(DOMAIN_PATTERN)
            .map(|re| re.is_match(&domain))
            .unwrap_or(false);
    if !valid {
        return Err(ValidationError::InvalidDomain(raw.trim().to_string()));
    }
    Ok(domain)
}

fn validate_upstream(raw: &str) -> Result<String, ValidationError> {
    let upstream = raw.trim();
    if upstream.is_empty() {
        return Err(ValidationError::EmptyField("upstream address"));
    }
    let valid = Regex::new(UPSTREAM_PATTERN)
        .map(|re| re.is_match(upstream))
        .unwrap_or(false);
    if !valid {
        return Err(ValidationError::InvalidUpstream(upstream.to_string()));
    }
    Ok(upstream.to_string())
}

fn require_file(field: &'static str, path: &Path) -> Result<(), ValidationError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ValidationError::PathNotFound {
            field,
            path: path.to_path_buf(),
        })
    }
}

/// 目标主机上的文件布局
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLayout {
    /// 站点配置目录
    pub sites_available: PathBuf,
    /// 已启用站点目录
    pub sites_enabled: PathBuf,
    /// 证书目录
    pub cert_dir: PathBuf,
    /// 私钥目录
    pub key_dir: PathBuf,
    /// certbot 的 live 目录
    pub acme_live_dir: PathBuf,
}

impl Default for HostLayout {
    fn default() -> Self {
        Self {
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            cert_dir: PathBuf::from("/etc/ssl/certs"),
            key_dir: PathBuf::from("/etc/ssl/private"),
            acme_live_dir: PathBuf::from("/etc/letsencrypt/live"),
        }
    }
}

impl HostLayout {
    pub fn site_config_path(&self, domain: &str) -> PathBuf {
        self.sites_available.join(domain)
    }

    pub fn site_link_path(&self, domain: &str) -> PathBuf {
        self.sites_enabled.join(domain)
    }

    pub fn cert_path(&self, domain: &str) -> PathBuf {
        self.cert_dir.join(format!("{domain}.crt"))
    }

    pub fn key_path(&self, domain: &str) -> PathBuf {
        self.key_dir.join(format!("{domain}.key"))
    }

    pub fn acme_cert_path(&self, domain: &str) -> PathBuf {
        self.acme_live_dir.join(domain).join("fullchain.pem")
    }

    pub fn acme_key_path(&self, domain: &str) -> PathBuf {
        self.acme_live_dir.join(domain).join("privkey.pem")
    }
}

#[cfg(test)]
impl HostLayout {
    /// 测试用：所有目录都放在 `root` 之下
    pub fn under(root: &Path) -> Self {
        Self {
            sites_available: root.join("sites-available"),
            sites_enabled: root.join("sites-enabled"),
            cert_dir: root.join("certs"),
            key_dir: root.join("private"),
            acme_live_dir: root.join("letsencrypt/live"),
        }
    }
}

/// 证书相关的文件配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSettings {
    pub strategy: Option<String>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub email: Option<String>,
}

/// 配置文件中预先给出的请求参数，缺失的字段会在运行时询问
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    pub domain: Option<String>,
    pub upstream: Option<String>,
    pub include_www: Option<bool>,
    pub install_vpn: Option<bool>,
    pub vpn_auth_key: Option<String>,
    pub firewall: Option<String>,
    pub certificate: CertificateSettings,
    pub reboot: Option<bool>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 运行记录目录，未设置时不写记录
    pub journal_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            journal_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSettings {
    /// 启用防火墙前放行 OpenSSH
    pub allow_ssh: bool,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self { allow_ssh: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub public_ip_url: String,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            public_ip_url: "https://api.ipify.org".to_string(),
        }
    }
}

/// 主配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub request: RequestSettings,
    pub paths: HostLayout,
    pub logging: LoggingSettings,
    pub firewall: FirewallSettings,
    pub status: StatusSettings,
}

impl Settings {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - JSON 配置文件路径
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }
}
