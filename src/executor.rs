use crate::error::{ProvisionError, StepError};
use crate::logger::{RunJournal, StepOutcome};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// 步骤的执行体
pub type StepAction<'a> = Box<dyn FnOnce(&mut dyn CommandRunner) -> Result<(), ProvisionError> + 'a>;

/// 一个配置步骤，按固定顺序构造，每次运行只执行一次
pub struct ProvisioningStep<'a> {
    description: String,
    idempotent: bool,
    preview: Vec<String>,
    action: StepAction<'a>,
}

impl<'a> ProvisioningStep<'a> {
    /// 执行单条外部命令的步骤
    pub fn command(description: &str, spec: CommandSpec) -> Self {
        let preview = vec![spec.to_string()];
        let name = description.to_string();
        Self {
            description: description.to_string(),
            idempotent: true,
            preview,
            action: Box::new(move |runner| {
                run_command(runner, &name, &spec)?;
                Ok(())
            }),
        }
    }

    /// 自定义执行体的步骤；`preview` 用于 dry-run 时展示将要做的事
    pub fn custom<F>(description: &str, preview: Vec<String>, action: F) -> Self
    where
        F: FnOnce(&mut dyn CommandRunner) -> Result<(), ProvisionError> + 'a,
    {
        Self {
            description: description.to_string(),
            idempotent: true,
            preview,
            action: Box::new(action),
        }
    }

    /// 标记为不可安全重复执行
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn preview(&self) -> &[String] {
        &self.preview
    }
}

impl std::fmt::Debug for ProvisioningStep<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningStep")
            .field("description", &self.description)
            .field("idempotent", &self.idempotent)
            .field("preview", &self.preview)
            .finish()
    }
}

/// 执行一条命令，非零退出码转换为 `StepError`
pub fn run_command(
    runner: &mut dyn CommandRunner,
    description: &str,
    spec: &CommandSpec,
) -> Result<CommandOutput, StepError> {
    log::debug!("Running: {spec}");
    let output = runner.run(spec).map_err(|e| StepError {
        description: description.to_string(),
        exit_status: None,
        stderr: format!("failed to start '{}': {e}", spec.program),
    })?;

    if output.success() {
        Ok(output)
    } else {
        let stderr = output.stderr.trim().to_string();
        if !stderr.is_empty() {
            log::error!("{spec}: {stderr}");
        }
        Err(StepError {
            description: description.to_string(),
            exit_status: output.status,
            stderr,
        })
    }
}

/// 按顺序执行步骤，遇到第一个失败立即停止
#[derive(Default)]
pub struct StepExecutor {
    dry_run: bool,
    journal: Option<RunJournal>,
}

impl StepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_journal(mut self, journal: Option<RunJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// 执行全部步骤
    ///
    /// 任一步骤失败时返回该错误，后续步骤不会执行；已完成的步骤不回滚。
    /// dry-run 模式下只打印计划。
    pub fn run(
        &mut self,
        steps: Vec<ProvisioningStep<'_>>,
        runner: &mut dyn CommandRunner,
    ) -> Result<(), ProvisionError> {
        let total = steps.len();

        if self.dry_run {
            println!("Dry run: {total} steps would be executed");
            for (index, step) in steps.iter().enumerate() {
                let marker = if step.idempotent { "" } else { " (not idempotent)" };
                println!("[{}/{total}] {}{marker}", index + 1, step.description);
                for line in &step.preview {
                    println!("        {line}");
                }
            }
            return Ok(());
        }

        for (index, step) in steps.into_iter().enumerate() {
            let ProvisioningStep {
                description,
                idempotent,
                action,
                ..
            } = step;

            log::info!("[{}/{total}] {description}", index + 1);
            if !idempotent {
                log::warn!("Step '{description}' is not idempotent; re-running it repeats its effect");
            }

            let result = action(runner);
            let outcome = match &result {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) => StepOutcome::Failed(e.to_string()),
            };
            if let Some(journal) = self.journal.as_mut() {
                journal.record(&description, idempotent, &outcome);
            }

            if let Err(e) = result {
                log::error!("Step '{description}' failed, aborting run: {e}");
                if index + 1 < total {
                    log::error!("{} remaining step(s) were not executed", total - index - 1);
                }
                return Err(e);
            }
            log::info!("✓ {description}");
        }

        Ok(())
    }
}
