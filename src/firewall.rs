use std::fmt;
use std::str::FromStr;

use crate::error::{FirewallError, ProvisionError};
use crate::executor::run_command;
use crate::runner::{CommandRunner, CommandSpec};

/// 防火墙规则集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallProfile {
    /// 放行 80 和 443
    Full,
    HttpOnly,
    HttpsOnly,
    /// 不修改防火墙
    None,
}

impl FirewallProfile {
    /// ufw 应用配置名称，`None` 没有对应规则
    pub fn rule_name(self) -> Option<&'static str> {
        match self {
            Self::Full => Some("Nginx Full"),
            Self::HttpOnly => Some("Nginx HTTP"),
            Self::HttpsOnly => Some("Nginx HTTPS"),
            Self::None => None,
        }
    }
}

impl FromStr for FirewallProfile {
    type Err = FirewallError;

    /// 接受菜单编号（1-4）、简写或完整的 ufw 名称；其他值一律拒绝，不回退到全开放
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "full" | "nginx full" => Ok(Self::Full),
            "2" | "http" | "http-only" | "nginx http" => Ok(Self::HttpOnly),
            "3" | "https" | "https-only" | "nginx https" => Ok(Self::HttpsOnly),
            "4" | "none" | "skip" => Ok(Self::None),
            _ => Err(FirewallError::InvalidProfile(s.trim().to_string())),
        }
    }
}

impl fmt::Display for FirewallProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule_name().unwrap_or("none"))
    }
}

/// 防火墙配置器（ufw）
#[derive(Debug, Clone, Copy)]
pub struct Firewall {
    allow_ssh: bool,
}

impl Firewall {
    pub fn new(allow_ssh: bool) -> Self {
        Self { allow_ssh }
    }

    /// 应用某个规则集所需的命令，`None` 为空
    pub fn commands(&self, profile: FirewallProfile) -> Vec<CommandSpec> {
        let Some(rule) = profile.rule_name() else {
            return Vec::new();
        };

        let mut commands = Vec::new();
        if self.allow_ssh {
            commands.push(CommandSpec::new("ufw", ["allow", "OpenSSH"]));
        }
        commands.push(CommandSpec::new("ufw", ["allow", rule]));
        commands.push(CommandSpec::new("ufw", ["--force", "enable"]));
        commands.push(CommandSpec::new("ufw", ["reload"]));
        commands
    }

    /// 应用规则集并启用防火墙
    pub fn apply(&self, profile: FirewallProfile, runner: &mut dyn CommandRunner) -> Result<(), ProvisionError> {
        if profile == FirewallProfile::None {
            log::info!("Firewall profile 'none' selected, leaving firewall untouched");
            return Ok(());
        }

        let description = format!("Configure firewall ({profile})");
        for command in self.commands(profile) {
            run_command(runner, &description, &command)?;
        }
        log::info!("Firewall enabled with profile '{profile}'");
        Ok(())
    }

    /// 解析操作员的原始选择后应用；无法识别时不做任何修改
    pub fn apply_choice(&self, choice: &str, runner: &mut dyn CommandRunner) -> Result<(), ProvisionError> {
        let profile: FirewallProfile = choice.parse()?;
        self.apply(profile, runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;

    #[test]
    fn test_parse_profiles() {
        assert_eq!("1".parse::<FirewallProfile>().unwrap(), FirewallProfile::Full);
        assert_eq!("Nginx HTTP".parse::<FirewallProfile>().unwrap(), FirewallProfile::HttpOnly);
        assert_eq!("https".parse::<FirewallProfile>().unwrap(), FirewallProfile::HttpsOnly);
        assert_eq!(" 4 ".parse::<FirewallProfile>().unwrap(), FirewallProfile::None);
    }

    #[test]
    fn test_invalid_profile_is_rejected_without_mutation() {
        let mut runner = RecordingRunner::new();
        for bad in ["5", "0", "", "open", "full please"] {
            let err = Firewall::new(true).apply_choice(bad, &mut runner).unwrap_err();
            assert!(
                matches!(err, ProvisionError::Firewall(FirewallError::InvalidProfile(_))),
                "{bad}"
            );
        }
        assert!(runner.command_lines().is_empty());
    }

    #[test]
    fn test_full_profile_is_applied_then_enabled() {
        let mut runner = RecordingRunner::new();
        Firewall::new(true).apply(FirewallProfile::Full, &mut runner).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ufw allow OpenSSH",
                "ufw allow 'Nginx Full'",
                "ufw --force enable",
                "ufw reload",
            ]
        );
    }

    #[test]
    fn test_ssh_rule_is_optional() {
        let commands = Firewall::new(false).commands(FirewallProfile::HttpsOnly);
        let lines: Vec<String> = commands.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["ufw allow 'Nginx HTTPS'", "ufw --force enable", "ufw reload"]);
    }

    #[test]
    fn test_none_profile_is_a_no_op() {
        let mut runner = RecordingRunner::new();
        Firewall::new(true).apply(FirewallProfile::None, &mut runner).unwrap();
        assert!(runner.command_lines().is_empty());
    }

    #[test]
    fn test_enable_failure_surfaces_step_error() {
        let mut runner = RecordingRunner::new().fail_when("ufw --force enable", 1, "ERROR: problem running");
        let err = Firewall::new(true).apply(FirewallProfile::Full, &mut runner).unwrap_err();
        assert!(matches!(err, ProvisionError::Step(_)));
        assert!(!runner.ran("ufw reload"));
    }
}
