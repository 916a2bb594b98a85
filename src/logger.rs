use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// 步骤的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

/// 运行记录，每个步骤结果追加一行到 `provision_<domain>.log`
///
/// 多次运行的记录累积在同一个文件中，便于失败后排查再重跑。
#[derive(Debug)]
pub struct RunJournal {
    path: PathBuf,
    file: File,
}

impl RunJournal {
    pub fn open(dir: &Path, domain: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        // 替换域名中的特殊字符，确保文件名有效
        let safe_domain = domain.replace(['.', ':', '/', '\\'], "_");
        let path = dir.join(format!("provision_{safe_domain}.log"));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::debug!("Run journal: {path:?}");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 写入失败只记警告，不影响运行
    pub fn record(&mut self, description: &str, idempotent: bool, outcome: &StepOutcome) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let kind = if idempotent { "idempotent" } else { "once" };
        let line = match outcome {
            StepOutcome::Succeeded => format!("{timestamp} [ok] {description} ({kind})"),
            StepOutcome::Failed(reason) => {
                format!("{timestamp} [FAILED] {description} ({kind}): {}", reason.replace('\n', " "))
            }
        };

        if let Err(e) = writeln!(self.file, "{line}") {
            log::warn!("Failed to write run journal {:?}: {e}", self.path);
        }
    }
}
