use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, instrument};

use orchestrator_core::{OrchestratorError, OrchestratorResult};

/// 外部命令的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// 执行命令行工具的接口，测试中可以替换为脚本化的输出
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> OrchestratorResult<CommandOutput>;
}

/// 基于 `tokio::process` 的实现
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip(self, args))]
    async fn run(&self, program: &str, args: &[String]) -> OrchestratorResult<CommandOutput> {
        let mut command = tokio::process::Command::new(program);
        command.kill_on_drop(true);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        debug!("执行命令: {} {}", program, args.join(" "));
        let output = timeout(self.timeout, command.output())
            .await
            // 超时按连接类错误处理，由重试策略决定是否再试
            .map_err(|_| {
                OrchestratorError::transport_error(format!(
                    "{program} 在 {:?} 内未返回 (socket timed out)",
                    self.timeout
                ))
            })?
            .map_err(|e| OrchestratorError::scheduler_error(format!("无法执行 {program}: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
