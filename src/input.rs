use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::{CertificateSource, CertificateStrategy, ProvisioningRequest, RequestSettings};
use crate::error::{ProvisionError, ValidationError};
use crate::firewall::FirewallProfile;

/// 粘贴PEM文本时的结束标记
pub const END_OF_INPUT: &str = "END";

/// 交互式输入来源，读写端可替换，测试中使用内存缓冲区
pub struct Prompter<R, W> {
    reader: R,
    writer: W,
    interactive: bool,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            interactive: true,
        }
    }

    /// 关闭提问，缺失的值直接报错
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// 提问并读取一行，流结束视为缺失
    pub fn ask(&mut self, field: &'static str, question: &str) -> Result<String, ValidationError> {
        if !self.interactive {
            return Err(ValidationError::MissingInput(field));
        }
        write!(self.writer, "{question}: ")?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(ValidationError::MissingInput(field));
        }
        Ok(line.trim().to_string())
    }

    pub fn ask_yes_no(&mut self, field: &'static str, question: &str, default: bool) -> Result<bool, ValidationError> {
        let hint = if default { "Y/n" } else { "y/N" };
        let answer = self.ask(field, &format!("{question} [{hint}]"))?;
        match answer.to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            _ => Err(ValidationError::InvalidChoice { field, value: answer }),
        }
    }

    /// 运行结束后决定是否重启，无法识别的回答按“否”处理
    pub fn confirm_reboot(&mut self, preset: Option<bool>) -> bool {
        if let Some(reboot) = preset {
            return reboot;
        }
        if !self.interactive {
            return false;
        }
        match self.ask_yes_no("reboot", "Reboot now?", false) {
            Ok(reboot) => reboot,
            Err(e) => {
                log::warn!("Not rebooting: {e}");
                false
            }
        }
    }

    /// 读取多行文本，直到单独一行 `END` 或输入结束
    pub fn read_block(&mut self, field: &'static str, instructions: &str) -> Result<String, ValidationError> {
        if !self.interactive {
            return Err(ValidationError::MissingInput(field));
        }
        writeln!(self.writer, "{instructions}")?;
        writeln!(self.writer, "Finish with a line containing only {END_OF_INPUT}.")?;
        self.writer.flush()?;

        let mut block = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 || line.trim() == END_OF_INPUT {
                break;
            }
            block.push_str(line.trim_end_matches(['\r', '\n']));
            block.push('\n');
        }

        if block.trim().is_empty() {
            return Err(ValidationError::EmptyField(field));
        }
        Ok(block)
    }

    fn say(&mut self, text: &str) -> Result<(), ValidationError> {
        if self.interactive {
            writeln!(self.writer, "{text}")?;
        }
        Ok(())
    }
}

/// 尚未补齐的请求参数：命令行参数覆盖配置文件，其余在运行时询问
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDraft {
    pub domain: Option<String>,
    pub upstream: Option<String>,
    pub include_www: Option<bool>,
    pub install_vpn: Option<bool>,
    pub vpn_auth_key: Option<String>,
    pub firewall: Option<String>,
    pub strategy: Option<String>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub email: Option<String>,
    pub reboot: Option<bool>,
}

impl RequestDraft {
    pub fn from_settings(settings: &RequestSettings) -> Self {
        Self {
            domain: settings.domain.clone(),
            upstream: settings.upstream.clone(),
            include_www: settings.include_www,
            install_vpn: settings.install_vpn,
            vpn_auth_key: settings.vpn_auth_key.clone(),
            firewall: settings.firewall.clone(),
            strategy: settings.certificate.strategy.clone(),
            cert_path: settings.certificate.cert_path.clone(),
            key_path: settings.certificate.key_path.clone(),
            email: settings.certificate.email.clone(),
            reboot: settings.reboot,
        }
    }

    /// `other` 中给出的字段优先
    pub fn overlay(self, other: RequestDraft) -> Self {
        Self {
            domain: other.domain.or(self.domain),
            upstream: other.upstream.or(self.upstream),
            include_www: other.include_www.or(self.include_www),
            install_vpn: other.install_vpn.or(self.install_vpn),
            vpn_auth_key: other.vpn_auth_key.or(self.vpn_auth_key),
            firewall: other.firewall.or(self.firewall),
            strategy: other.strategy.or(self.strategy),
            cert_path: other.cert_path.or(self.cert_path),
            key_path: other.key_path.or(self.key_path),
            email: other.email.or(self.email),
            reboot: other.reboot.or(self.reboot),
        }
    }
}

const FIREWALL_MENU: &str = "Firewall profile:
  1) Nginx Full  (HTTP and HTTPS)
  2) Nginx HTTP  (port 80 only)
  3) Nginx HTTPS (port 443 only)
  4) None        (leave firewall untouched)";

const CERTIFICATE_MENU: &str = "Certificate source:
  1) Use existing certificate and key files
  2) Paste certificate and key (PEM)
  3) Obtain a certificate with Let's Encrypt (certbot)";

/// 收集并校验请求参数
///
/// 不重试：任一输入不合法立即返回错误，此时尚未执行任何步骤。
pub fn collect<R: BufRead, W: Write>(
    draft: RequestDraft,
    prompter: &mut Prompter<R, W>,
) -> Result<ProvisioningRequest, ProvisionError> {
    let domain = match draft.domain {
        Some(domain) => domain,
        None => prompter.ask("domain", "Domain name (e.g. example.com)")?,
    };
    if domain.trim().is_empty() {
        return Err(ValidationError::EmptyField("domain").into());
    }
    let upstream = match draft.upstream {
        Some(upstream) => upstream,
        None => prompter.ask("upstream address", "Upstream service address (e.g. http://127.0.0.1:3000)")?,
    };
    if upstream.trim().is_empty() {
        return Err(ValidationError::EmptyField("upstream address").into());
    }
    let include_www = match draft.include_www {
        Some(include) => include,
        None if prompter.is_interactive() => {
            prompter.ask_yes_no("www alias", &format!("Also serve www.{}?", domain.trim()), true)?
        }
        None => true,
    };
    let install_vpn = match draft.install_vpn {
        Some(install) => install,
        None => prompter.ask_yes_no("VPN agent", "Install and enable the Tailscale agent?", true)?,
    };

    let firewall_choice = match draft.firewall {
        Some(choice) => choice,
        None => {
            prompter.say(FIREWALL_MENU)?;
            prompter.ask("firewall profile", "Choice [1-4]")?
        }
    };
    let firewall: FirewallProfile = firewall_choice.parse()?;

    let strategy_choice = match draft.strategy {
        Some(choice) => choice,
        None => {
            prompter.say(CERTIFICATE_MENU)?;
            prompter.ask("certificate strategy", "Choice [1-3]")?
        }
    };
    let certificate = match strategy_choice.parse::<CertificateStrategy>()? {
        CertificateStrategy::ExistingFiles => {
            let cert_path = match draft.cert_path {
                Some(path) => path,
                None => PathBuf::from(prompter.ask("certificate path", "Path to certificate file")?),
            };
            let key_path = match draft.key_path {
                Some(path) => path,
                None => PathBuf::from(prompter.ask("private key path", "Path to private key file")?),
            };
            if cert_path.as_os_str().is_empty() {
                return Err(ValidationError::EmptyField("certificate path").into());
            }
            if key_path.as_os_str().is_empty() {
                return Err(ValidationError::EmptyField("private key path").into());
            }
            CertificateSource::ExistingFiles { cert_path, key_path }
        }
        CertificateStrategy::PastedData => {
            let cert_pem = prompter.read_block("certificate", "Paste the certificate (PEM, including the chain if any).")?;
            let key_pem = prompter.read_block("private key", "Paste the private key (PEM).")?;
            CertificateSource::PastedData { cert_pem, key_pem }
        }
        CertificateStrategy::Acme => {
            let email = match draft.email {
                Some(email) => Some(email),
                None if prompter.is_interactive() => {
                    Some(prompter.ask("ACME email", "Email for Let's Encrypt notices (empty to skip)")?)
                }
                None => None,
            };
            CertificateSource::Acme {
                email: email.filter(|e| !e.trim().is_empty()).map(|e| e.trim().to_string()),
            }
        }
    };

    let request = ProvisioningRequest::new(&domain, &upstream, firewall, certificate)?
        .with_www(include_www)
        .with_vpn(install_vpn, draft.vpn_auth_key);
    log::info!(
        "Collected request: domain={}, upstream={}, firewall={}, certificate={}",
        request.domain(),
        request.upstream(),
        request.firewall(),
        request.certificate().strategy()
    );
    Ok(request)
}
