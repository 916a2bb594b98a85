use std::fmt;
use std::io;
use std::process::{Command, Stdio};

/// 一条外部命令的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// 继承终端的标准输入输出（例如需要操作员查看登录链接时）
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            interactive: false,
        }
    }

    /// 通过 `sh -c` 执行一段脚本
    pub fn shell(script: &str) -> Self {
        Self::new("sh", ["-c", script])
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    /// 输出可读的命令行，密钥参数会被遮盖
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg.split_once('=') {
                Some((flag, _)) if flag == "--authkey" => write!(f, " {flag}=***")?,
                _ if arg.contains(char::is_whitespace) => write!(f, " '{arg}'")?,
                _ => write!(f, " {arg}")?,
            }
        }
        Ok(())
    }
}

/// 外部命令的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 退出码，被信号终止时为 `None`
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// 执行外部命令的能力，测试中可替换为 [`RecordingRunner`]
pub trait CommandRunner {
    fn run(&mut self, command: &CommandSpec) -> io::Result<CommandOutput>;
}

/// 在本机上真正执行命令
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        log::debug!("Executing: {spec}");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        if spec.interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            return Ok(CommandOutput {
                status: status.code(),
                ..Default::default()
            });
        }

        let output = command.stdin(Stdio::null()).output()?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.stdout.trim().is_empty() {
            log::debug!("{}", result.stdout.trim_end());
        }
        Ok(result)
    }
}

/// 记录所有调用而不真正执行的命令执行器
///
/// 可以指定某些命令返回失败，用来驱动失败路径。
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invoked: Vec<CommandSpec>,
    failures: Vec<(String, i32, String)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命令行以 `prefix` 开头的命令返回退出码 `code`
    pub fn fail_when(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.failures.push((prefix.to_string(), code, stderr.to_string()));
        self
    }

    /// 已执行命令的命令行，按执行顺序
    pub fn command_lines(&self) -> Vec<String> {
        self.invoked.iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.invoked.iter().any(|c| c.to_string().starts_with(prefix))
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.invoked.iter().position(|c| c.to_string().starts_with(prefix))
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, command: &CommandSpec) -> io::Result<CommandOutput> {
        let line = command.to_string();
        self.invoked.push(command.clone());
        let failure = self
            .failures
            .iter()
            .find(|(prefix, _, _)| line.starts_with(prefix.as_str()));
        Ok(match failure {
            Some((_, code, stderr)) => CommandOutput {
                status: Some(*code),
                stderr: stderr.clone(),
                ..Default::default()
            },
            None => CommandOutput {
                status: Some(0),
                ..Default::default()
            },
        })
    }
}
