use std::fs;
use std::path::{Path, PathBuf};

use crate::cert::CertificateMaterial;
use crate::config::{HostLayout, ProvisioningRequest};
use crate::error::{CertError, ProvisionError};
use crate::runner::{CommandRunner, CommandSpec};

/// 渲染好的 nginx 虚拟主机配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    domain: String,
    text: String,
}

/// 生成虚拟主机配置：80 端口跳转到 HTTPS，443 端口终止 TLS 并反向代理到上游
///
/// 纯函数，相同输入得到逐字节相同的输出。
pub fn render(request: &ProvisioningRequest, material: &CertificateMaterial) -> RenderedConfig {
    let server_names = request.server_names().join(" ");
    let text = format!(
        r#"# Managed by proxy-provision for {domain}
server {{
    listen 80;
    listen [::]:80;
    server_name {server_names};

    return 301 https://$host$request_uri;
}}

server {{
    listen 443 ssl;
    listen [::]:443 ssl;
    server_name {server_names};

    ssl_certificate {cert};
    ssl_certificate_key {key};
    ssl_protocols TLSv1.2 TLSv1.3;

    location / {{
        proxy_pass {upstream};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";
        proxy_set_header Host $host;
        proxy_set_header X-Forwarded-Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"#,
        domain = request.domain(),
        cert = material.cert_path.display(),
        key = material.key_path.display(),
        upstream = request.upstream(),
    );

    RenderedConfig {
        domain: request.domain().to_string(),
        text,
    }
}

impl RenderedConfig {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 写入站点配置目录，并在已启用站点目录中建立指向它的符号链接
    ///
    /// # 返回值
    /// 写入的配置文件路径
    pub fn install(&self, layout: &HostLayout) -> Result<PathBuf, CertError> {
        let config_path = layout.site_config_path(&self.domain);
        let link_path = layout.site_link_path(&self.domain);

        for dir in [&layout.sites_available, &layout.sites_enabled] {
            fs::create_dir_all(dir).map_err(|source| CertError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        fs::write(&config_path, &self.text).map_err(|source| CertError::Io {
            path: config_path.clone(),
            source,
        })?;
        log::info!("Wrote site configuration {config_path:?}");

        activate(&config_path, &link_path).map_err(|source| CertError::Io {
            path: link_path.clone(),
            source,
        })?;
        log::info!("Activated site via {link_path:?}");

        Ok(config_path)
    }
}

/// 已存在的链接或文件会被替换
fn activate(target: &Path, link: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(not(unix))]
    {
        fs::copy(target, link).map(|_| ())
    }
}

pub fn config_check_command() -> CommandSpec {
    CommandSpec::new("nginx", ["-t"])
}

/// 用 `nginx -t` 检查配置语法
///
/// 失败时保留已写入的配置供人工检查，返回 `CertError::ConfigInvalid`。
pub fn check_config(runner: &mut dyn CommandRunner, config_path: &Path) -> Result<(), ProvisionError> {
    let command = config_check_command();
    let invalid = |stderr: String| CertError::ConfigInvalid {
        path: config_path.to_path_buf(),
        stderr,
    };

    let output = runner
        .run(&command)
        .map_err(|e| invalid(format!("failed to run '{command}': {e}")))?;
    if !output.success() {
        let stderr = output.stderr.trim().to_string();
        log::error!("nginx configuration test failed: {stderr}");
        return Err(invalid(stderr).into());
    }
    log::info!("nginx configuration test passed");
    Ok(())
}
