use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use orchestrator_core::{
    config::{AppConfig, StageConfig},
    models::{ExecutionOutcome, FileDescriptor, JobContext, WorkKey},
    traits::{DataReadinessGate, JobStrategy, SchedulerClient},
    OrchestratorError, OrchestratorResult,
};
use orchestrator_domain::StageFactory;

use crate::template::TemplateVars;

/// 由配置驱动的通用阶段：渲染批处理脚本、检查输入输出、登记产出
#[derive(Debug, Clone)]
pub struct ScriptStage {
    work_type: String,
    command: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    depends_on: Vec<String>,
    comparison: Option<String>,
    walltime: String,
    nodes: u32,
    run_dir: PathBuf,
    case: String,
    partition: Option<String>,
    account: Option<String>,
}

impl ScriptStage {
    fn vars(&self, ctx: &JobContext) -> TemplateVars {
        TemplateVars::new(ctx, &self.case, self.comparison.as_deref(), &self.run_dir)
    }

    pub fn script_path(&self, ctx: &JobContext) -> PathBuf {
        self.run_dir
            .join("scripts")
            .join(format!("{}.sh", ctx.job_name()))
    }

    /// 作业脚本成功结束时创建的标记文件
    pub fn marker_path(&self, ctx: &JobContext) -> PathBuf {
        self.run_dir
            .join("status")
            .join(format!("{}.done", ctx.job_name()))
    }

    pub fn staging_dir(&self, ctx: &JobContext) -> PathBuf {
        self.run_dir.join("input").join(ctx.job_name())
    }

    pub fn input_paths(&self, ctx: &JobContext) -> Vec<PathBuf> {
        self.vars(ctx)
            .expand_all(&self.inputs)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn output_paths(&self, ctx: &JobContext) -> Vec<PathBuf> {
        self.vars(ctx)
            .expand_all(&self.outputs)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn render_script(&self, ctx: &JobContext) -> String {
        let name = ctx.job_name();
        let output_log = self
            .run_dir
            .join("output")
            .join(format!("{name}.%j.out"));

        let mut script = String::from("#!/bin/bash\n");
        let _ = writeln!(script, "#SBATCH --job-name={name}");
        let _ = writeln!(script, "#SBATCH --nodes={}", self.nodes);
        let _ = writeln!(script, "#SBATCH --time={}", self.walltime);
        if let Some(partition) = &self.partition {
            let _ = writeln!(script, "#SBATCH --partition={partition}");
        }
        if let Some(account) = &self.account {
            let _ = writeln!(script, "#SBATCH --account={account}");
        }
        let _ = writeln!(script, "#SBATCH --output={}", output_log.display());
        script.push_str("\nset -e\n\n");
        script.push_str(&self.vars(ctx).render(&self.command, None));
        script.push('\n');
        let _ = writeln!(script, "\ntouch {}", self.marker_path(ctx).display());
        script
    }

    /// 把输入文件链接到作业自己的输入目录
    async fn stage_inputs(&self, ctx: &JobContext, inputs: &[PathBuf]) -> std::io::Result<()> {
        let staging = self.staging_dir(ctx);
        tokio::fs::create_dir_all(&staging).await?;
        for input in inputs {
            let Some(file_name) = input.file_name() else {
                continue;
            };
            let link = staging.join(file_name);
            if tokio::fs::symlink_metadata(&link).await.is_ok() {
                continue;
            }
            link_file(input, &link).await?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn link_file(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, link).await
}

#[cfg(not(unix))]
async fn link_file(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::copy(source, link).await.map(|_| ())
}

async fn all_exist(paths: &[PathBuf]) -> bool {
    for path in paths {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("缺少文件: {}", path.display());
            return false;
        }
    }
    true
}

#[async_trait]
impl JobStrategy for ScriptStage {
    fn setup_dependencies(
        &self,
        ctx: &JobContext,
        siblings: &[WorkKey],
    ) -> OrchestratorResult<Vec<String>> {
        for dependency in &self.depends_on {
            if !siblings.iter().any(|key| &key.work_type == dependency) {
                return Err(OrchestratorError::dependency_not_found(
                    &self.work_type,
                    dependency.clone(),
                    format!(
                        "{} [{:04}-{:04}]",
                        ctx.window_ordinal, ctx.start_year, ctx.end_year
                    ),
                ));
            }
        }
        Ok(self.depends_on.clone())
    }

    async fn prevalidate(&self, ctx: &JobContext) -> bool {
        let inputs = self.input_paths(ctx);
        if !all_exist(&inputs).await {
            return false;
        }
        if inputs.is_empty() {
            return true;
        }
        match self.stage_inputs(ctx, &inputs).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} 链接输入文件失败: {}", ctx.job_name(), e);
                false
            }
        }
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        scheduler: &dyn SchedulerClient,
        dryrun: bool,
    ) -> OrchestratorResult<ExecutionOutcome> {
        let script_path = self.script_path(ctx);
        if let Some(dir) = script_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::create_dir_all(self.run_dir.join("output")).await?;
        tokio::fs::create_dir_all(self.run_dir.join("status")).await?;
        tokio::fs::write(&script_path, self.render_script(ctx)).await?;

        if dryrun {
            info!("dry-run: 已生成 {}，跳过提交", script_path.display());
            return Ok(ExecutionOutcome::Skipped);
        }

        let id = scheduler.submit(&script_path).await?;
        Ok(ExecutionOutcome::Submitted(id))
    }

    async fn postvalidate(&self, ctx: &JobContext) -> bool {
        if !tokio::fs::try_exists(self.marker_path(ctx))
            .await
            .unwrap_or(false)
        {
            return false;
        }
        all_exist(&self.output_paths(ctx)).await
    }

    async fn handle_completion(
        &self,
        ctx: &JobContext,
        gate: &dyn DataReadinessGate,
    ) -> OrchestratorResult<()> {
        let mut files = Vec::new();
        for path in self.output_paths(ctx) {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) => files.push(FileDescriptor {
                    path,
                    size: metadata.len(),
                }),
                Err(e) => warn!("{} 的输出 {} 不可读，不登记: {}", ctx.job_name(), path.display(), e),
            }
        }
        if files.is_empty() {
            debug!("{} 没有可登记的输出", ctx.job_name());
            return Ok(());
        }
        gate.register_produced_artifacts(&self.work_type, files).await
    }

    fn comparison(&self) -> Option<&str> {
        self.comparison.as_deref()
    }
}

/// 为任意作业类型构造 [`ScriptStage`]，作为注册表的默认工厂
#[derive(Debug, Clone)]
pub struct ScriptStageFactory {
    run_dir: PathBuf,
    case: String,
    partition: Option<String>,
    account: Option<String>,
}

impl ScriptStageFactory {
    pub fn new(run_dir: impl Into<PathBuf>, case: impl Into<String>) -> Self {
        Self {
            run_dir: run_dir.into(),
            case: case.into(),
            partition: None,
            account: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            run_dir: config.run.run_dir.clone(),
            case: config.simulation.case.clone(),
            partition: config.scheduler.partition.clone(),
            account: config.scheduler.account.clone(),
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn build(&self, stage: &StageConfig) -> ScriptStage {
        ScriptStage {
            work_type: stage.work_type.clone(),
            command: stage.command.clone(),
            inputs: stage.inputs.clone(),
            outputs: stage.outputs.clone(),
            depends_on: stage.depends_on.clone(),
            comparison: stage.comparison.clone(),
            walltime: stage.walltime.clone(),
            nodes: stage.nodes,
            run_dir: self.run_dir.clone(),
            case: self.case.clone(),
            partition: self.partition.clone(),
            account: self.account.clone(),
        }
    }
}

impl StageFactory for ScriptStageFactory {
    fn create(&self, stage: &StageConfig) -> OrchestratorResult<Arc<dyn JobStrategy>> {
        if stage.command.trim().is_empty() {
            return Err(OrchestratorError::config_error(format!(
                "阶段 {} 没有配置 command",
                stage.work_type
            )));
        }
        Ok(Arc::new(self.build(stage)))
    }
}
