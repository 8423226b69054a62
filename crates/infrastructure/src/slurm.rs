use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orchestrator_core::{
    config::SchedulerConfig,
    models::{ExternalJobId, JobStatus, QueueEntry},
    traits::SchedulerClient,
    OrchestratorError, OrchestratorResult,
};

use crate::command_runner::{CommandOutput, CommandRunner, TokioCommandRunner};
use crate::retry::RetryPolicy;

/// 调度器在负载高时偶发的连接类错误
const TRANSPORT_MARKERS: &[&str] = &[
    "socket timed out",
    "transport endpoint is not connected",
    "unable to contact slurm controller",
    "connection refused",
    "connection reset",
];

const INVALID_JOB_MARKER: &str = "invalid job id specified";

/// Slurm 状态到作业状态的固定映射，未知状态保守地视为 RUNNING
pub fn map_slurm_state(state: &str) -> JobStatus {
    let state = state.trim().trim_end_matches('+').to_ascii_uppercase();
    let state = state.split_whitespace().next().unwrap_or_default();
    match state {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "RESV_DEL_HOLD" | "SUSPENDED" => {
            JobStatus::Pending
        }
        "RUNNING" | "COMPLETING" | "STAGE_OUT" | "SIGNALING" => JobStatus::Running,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" | "NODE_FAIL" | "TIMEOUT" | "OUT_OF_MEMORY" | "BOOT_FAIL" | "DEADLINE" => {
            JobStatus::Failed
        }
        "CANCELLED" | "PREEMPTED" | "REVOKED" => JobStatus::Cancelled,
        other => {
            warn!("未知的调度器状态 {:?}，按 RUNNING 处理", other);
            JobStatus::Running
        }
    }
}

fn classify_failure(program: &str, output: &CommandOutput) -> OrchestratorError {
    let stderr = output.stderr.trim();
    let lowered = stderr.to_ascii_lowercase();
    if TRANSPORT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return OrchestratorError::transport_error(format!("{program}: {stderr}"));
    }
    OrchestratorError::scheduler_error(format!(
        "{program} 退出码 {}: {stderr}",
        output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "无".to_string())
    ))
}

fn is_invalid_job(output: &CommandOutput) -> bool {
    output.stderr.to_ascii_lowercase().contains(INVALID_JOB_MARKER)
}

/// `Submitted batch job 12345`
fn parse_sbatch(stdout: &str) -> OrchestratorResult<ExternalJobId> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| {
            OrchestratorError::scheduler_error(format!("无法解析 sbatch 输出: {}", stdout.trim()))
        })
}

/// 从 `scontrol show job` 输出中取 `JobState=`
fn parse_job_state(stdout: &str) -> Option<&str> {
    stdout
        .split_whitespace()
        .find_map(|token| token.strip_prefix("JobState="))
}

/// `squeue -h -o %i|%j|%T` 的每一行
fn parse_queue(stdout: &str) -> Vec<QueueEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, '|');
            let id = parts.next()?.trim().parse().ok()?;
            let name = parts.next()?.trim().to_string();
            let state = parts.next()?.trim().to_string();
            Some(QueueEntry {
                id,
                name,
                status: map_slurm_state(&state),
                state,
            })
        })
        .collect()
}

/// `sinfo -h -o %D` 每行一个节点数
fn parse_node_count(stdout: &str) -> usize {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<usize>().ok())
        .sum()
}

/// 通过命令行驱动 Slurm 的调度器客户端
pub struct SlurmClient<R: CommandRunner = TokioCommandRunner> {
    runner: R,
    retry: RetryPolicy,
    token: CancellationToken,
    partition: Option<String>,
    user: Option<String>,
}

impl SlurmClient<TokioCommandRunner> {
    pub fn from_config(config: &SchedulerConfig, token: CancellationToken) -> Self {
        Self::with_runner(TokioCommandRunner::default(), config, token)
    }
}

impl<R: CommandRunner> SlurmClient<R> {
    pub fn with_runner(runner: R, config: &SchedulerConfig, token: CancellationToken) -> Self {
        Self {
            runner,
            retry: RetryPolicy::from_config(config),
            token,
            partition: config.partition.clone(),
            user: config.user.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 运行命令；非零退出码按 stderr 内容分类
    async fn invoke(&self, program: &str, args: Vec<String>) -> OrchestratorResult<CommandOutput> {
        let args = &args;
        self.retry
            .run(program, &self.token, move || async move {
                let output = self.runner.run(program, args).await?;
                if output.success || is_invalid_job(&output) {
                    Ok(output)
                } else {
                    Err(classify_failure(program, &output))
                }
            })
            .await
    }
}

#[async_trait]
impl<R: CommandRunner> SchedulerClient for SlurmClient<R> {
    async fn submit(&self, script: &Path) -> OrchestratorResult<ExternalJobId> {
        let output = self
            .invoke("sbatch", vec![script.to_string_lossy().into_owned()])
            .await?;
        if !output.success {
            return Err(OrchestratorError::scheduler_error(output.stderr.trim().to_string()));
        }
        let id = parse_sbatch(&output.stdout)?;
        info!("已提交 {} -> 作业 {}", script.display(), id);
        Ok(id)
    }

    async fn query(&self, id: ExternalJobId) -> OrchestratorResult<JobStatus> {
        let output = self
            .invoke(
                "scontrol",
                vec!["show".to_string(), "job".to_string(), id.to_string()],
            )
            .await?;
        if is_invalid_job(&output) {
            return Err(OrchestratorError::SchedulerJobNotFound { id });
        }
        let state = parse_job_state(&output.stdout).ok_or_else(|| {
            OrchestratorError::scheduler_error(format!("scontrol 输出中没有作业 {id} 的状态"))
        })?;
        debug!("作业 {} 状态 {}", id, state);
        Ok(map_slurm_state(state))
    }

    async fn list_queue(&self) -> OrchestratorResult<Vec<QueueEntry>> {
        let mut args = vec!["-h".to_string(), "-o".to_string(), "%i|%j|%T".to_string()];
        if let Some(user) = &self.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        let output = self.invoke("squeue", args).await?;
        Ok(parse_queue(&output.stdout))
    }

    async fn cancel(&self, id: ExternalJobId) -> OrchestratorResult<bool> {
        let output = self.invoke("scancel", vec![id.to_string()]).await?;
        if !output.success {
            warn!("scancel 未找到作业 {}", id);
        }
        Ok(output.success)
    }

    async fn node_count(&self) -> OrchestratorResult<usize> {
        let mut args = vec!["-h".to_string(), "-o".to_string(), "%D".to_string()];
        if let Some(partition) = &self.partition {
            args.push("-p".to_string());
            args.push(partition.clone());
        }
        let output = self.invoke("sinfo", args).await?;
        Ok(parse_node_count(&output.stdout))
    }
}
