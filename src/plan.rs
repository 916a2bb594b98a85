use crate::cert::CertificateResolver;
use crate::config::{CertificateSource, HostLayout, ProvisioningRequest};
use crate::error::ProvisionError;
use crate::executor::{ProvisioningStep, StepExecutor};
use crate::firewall::{Firewall, FirewallProfile};
use crate::render::{check_config, config_check_command, render};
use crate::runner::{CommandRunner, CommandSpec};

const TAILSCALE_INSTALL: &str = "curl -fsSL https://tailscale.com/install.sh | sh";

fn apt_install(packages: &[&str]) -> CommandSpec {
    let mut args = vec!["install", "-y"];
    args.extend_from_slice(packages);
    CommandSpec::new("apt-get", args).env("DEBIAN_FRONTEND", "noninteractive")
}

fn systemctl(args: &[&str]) -> CommandSpec {
    CommandSpec::new("systemctl", args.iter().copied())
}

/// 按固定顺序构造本次运行的全部步骤
///
/// 软件包 → VPN → 启动 nginx → 防火墙 → 证书 → 站点配置 → 语法检查 → 重启 nginx。
/// nginx 需要在证书步骤之前运行，certbot 的 nginx 插件依赖它。
pub fn build_steps<'a>(
    request: &'a ProvisioningRequest,
    layout: &'a HostLayout,
    firewall: Firewall,
) -> Vec<ProvisioningStep<'a>> {
    let mut steps = vec![
        ProvisioningStep::command("Update package index", CommandSpec::new("apt-get", ["update"])),
        ProvisioningStep::command("Install nginx", apt_install(&["nginx"])),
    ];

    if request.install_vpn() {
        steps.push(ProvisioningStep::command(
            "Install Tailscale agent",
            CommandSpec::shell(TAILSCALE_INSTALL),
        ));
        steps.push(ProvisioningStep::command(
            "Enable Tailscale agent",
            systemctl(&["enable", "--now", "tailscaled"]),
        ));
        let join = match request.vpn_auth_key() {
            Some(key) => CommandSpec::new("tailscale", ["up".to_string(), format!("--authkey={key}")]),
            None => CommandSpec::new("tailscale", ["up"]).interactive(),
        };
        steps.push(ProvisioningStep::command("Join tailnet", join).non_idempotent());
    }

    steps.push(ProvisioningStep::command(
        "Enable and start nginx",
        systemctl(&["enable", "--now", "nginx"]),
    ));

    let profile = request.firewall();
    if profile != FirewallProfile::None {
        let preview = firewall.commands(profile).iter().map(ToString::to_string).collect();
        steps.push(ProvisioningStep::custom(
            &format!("Configure firewall ({profile})"),
            preview,
            move |runner| firewall.apply(profile, runner),
        ));
    }

    let resolver = CertificateResolver::new(layout);
    let material = resolver.material_for(request);
    let cert_preview = match request.certificate() {
        CertificateSource::ExistingFiles { cert_path, key_path } => vec![
            format!("copy {} -> {}", cert_path.display(), material.cert_path.display()),
            format!("copy {} -> {}", key_path.display(), material.key_path.display()),
        ],
        CertificateSource::PastedData { .. } => vec![
            format!("write {} (0644)", material.cert_path.display()),
            format!("write {} (0600)", material.key_path.display()),
        ],
        CertificateSource::Acme { .. } => crate::cert::acme_commands(request)
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    steps.push(ProvisioningStep::custom(
        &format!("Install certificate ({})", request.certificate().strategy()),
        cert_preview,
        move |runner| resolver.resolve(request, runner).map(|_| ()),
    ));

    let rendered = render(request, &material);
    let config_path = layout.site_config_path(request.domain());
    let link_path = layout.site_link_path(request.domain());
    steps.push(ProvisioningStep::custom(
        "Write and activate site configuration",
        vec![
            format!("write {}", config_path.display()),
            format!("ln -sf {} {}", config_path.display(), link_path.display()),
        ],
        move |_| {
            rendered.install(layout)?;
            Ok(())
        },
    ));

    steps.push(ProvisioningStep::custom(
        "Check nginx configuration",
        vec![config_check_command().to_string()],
        move |runner| check_config(runner, &config_path),
    ));

    steps.push(ProvisioningStep::command(
        "Restart nginx",
        systemctl(&["restart", "nginx"]),
    ));

    steps
}

/// 最后一步：重启主机
pub fn reboot_step() -> ProvisioningStep<'static> {
    ProvisioningStep::command("Reboot host", systemctl(&["reboot"])).non_idempotent()
}

/// 构造并执行完整的配置流程
pub fn provision(
    request: &ProvisioningRequest,
    layout: &HostLayout,
    firewall: Firewall,
    executor: &mut StepExecutor,
    runner: &mut dyn CommandRunner,
) -> Result<(), ProvisionError> {
    let steps = build_steps(request, layout, firewall);
    executor.run(steps, runner)
}
