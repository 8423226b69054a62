use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use orchestrator_core::{
    models::{ExecutionOutcome, ExternalJobId, JobContext, JobStatus, WorkKey},
    traits::{DataReadinessGate, JobStrategy, SchedulerClient},
    OrchestratorResult, StructuredLogger,
};

/// 作用于某个时间窗口的单个流水线阶段实例
///
/// 通用字段放在这里，阶段相关的行为委托给嵌入的 [`JobStrategy`]。
pub struct Job {
    id: Uuid,
    key: WorkKey,
    start_year: i32,
    end_year: i32,
    window_ordinal: usize,
    status: JobStatus,
    external_id: Option<ExternalJobId>,
    depends_on: Vec<String>,
    submitted: bool,
    submit_failures: u32,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    strategy: Arc<dyn JobStrategy>,
}

impl Job {
    pub fn new(
        key: WorkKey,
        window_ordinal: usize,
        start_year: i32,
        end_year: i32,
        strategy: Arc<dyn JobStrategy>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            start_year,
            end_year,
            window_ordinal,
            status: JobStatus::Valid,
            external_id: None,
            depends_on: Vec::new(),
            submitted: false,
            submit_failures: 0,
            started_at: None,
            ended_at: None,
            strategy,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn key(&self) -> &WorkKey {
        &self.key
    }
    pub fn work_type(&self) -> &str {
        &self.key.work_type
    }
    pub fn data_subtype(&self) -> Option<&str> {
        self.key.data_subtype.as_deref()
    }
    pub fn start_year(&self) -> i32 {
        self.start_year
    }
    pub fn end_year(&self) -> i32 {
        self.end_year
    }
    pub fn window_ordinal(&self) -> usize {
        self.window_ordinal
    }
    pub fn status(&self) -> JobStatus {
        self.status
    }
    pub fn external_id(&self) -> Option<ExternalJobId> {
        self.external_id
    }
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
    pub fn has_been_submitted(&self) -> bool {
        self.submitted
    }
    pub fn submit_failures(&self) -> u32 {
        self.submit_failures
    }
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
    pub fn comparison(&self) -> Option<&str> {
        self.strategy.comparison()
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            id: self.id,
            key: self.key.clone(),
            start_year: self.start_year,
            end_year: self.end_year,
            window_ordinal: self.window_ordinal,
        }
    }

    pub fn name(&self) -> String {
        self.context().job_name()
    }

    /// 按状态机更新状态，非法转换被忽略并返回 false
    pub fn set_status(&mut self, next: JobStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_transition_to(next) {
            warn!(
                "作业 {} 的状态转换无效: {} -> {}，已忽略",
                self.name(),
                self.status,
                next
            );
            return false;
        }
        StructuredLogger::log_job_transition(&self.context(), self.status, next);
        self.status = next;
        true
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
    }

    pub fn mark_ended(&mut self, at: DateTime<Utc>) {
        self.ended_at = Some(at);
    }

    /// 计算并保存依赖的作业类型（初始化阶段调用一次）
    pub fn setup_dependencies(&mut self, siblings: &[WorkKey]) -> OrchestratorResult<()> {
        let mut depends_on = self.strategy.setup_dependencies(&self.context(), siblings)?;
        let mut seen = std::collections::HashSet::new();
        depends_on.retain(|work_type| seen.insert(work_type.clone()));
        if !depends_on.is_empty() {
            debug!("作业 {} 依赖: {:?}", self.name(), depends_on);
        }
        self.depends_on = depends_on;
        Ok(())
    }

    pub async fn prevalidate(&self) -> bool {
        self.strategy.prevalidate(&self.context()).await
    }

    pub async fn postvalidate(&self) -> bool {
        self.strategy.postvalidate(&self.context()).await
    }

    /// 执行作业
    ///
    /// 输出已存在时直接视为完成；输入不足时进入 WAITING_ON_INPUT。
    /// 提交错误原样返回，由调用方决定重试策略，作业状态保持不变。
    pub async fn execute(
        &mut self,
        scheduler: &dyn SchedulerClient,
        dryrun: bool,
    ) -> OrchestratorResult<ExecutionOutcome> {
        let ctx = self.context();

        if self.strategy.postvalidate(&ctx).await {
            debug!("作业 {} 的输出已存在，跳过提交", ctx.job_name());
            self.set_status(JobStatus::Completed);
            return Ok(ExecutionOutcome::Skipped);
        }

        if !self.strategy.prevalidate(&ctx).await {
            debug!("作业 {} 的输入尚不完整，等待下一轮", ctx.job_name());
            self.set_status(JobStatus::WaitingOnInput);
            return Ok(ExecutionOutcome::Deferred);
        }

        let outcome = self.strategy.execute(&ctx, scheduler, dryrun).await?;
        match outcome {
            ExecutionOutcome::Submitted(external_id) => {
                self.external_id = Some(external_id);
                self.submitted = true;
                self.set_status(JobStatus::Submitted);
                StructuredLogger::log_job_submitted(&ctx, external_id);
            }
            ExecutionOutcome::Skipped => {
                self.set_status(JobStatus::Completed);
            }
            ExecutionOutcome::Deferred => {
                self.set_status(JobStatus::WaitingOnInput);
            }
        }
        Ok(outcome)
    }

    /// 提交失败后回到 VALID 等待下一轮，返回累计失败次数
    pub fn record_submission_failure(&mut self) -> u32 {
        self.submit_failures += 1;
        if self.status == JobStatus::WaitingOnInput {
            self.set_status(JobStatus::Valid);
        }
        self.submit_failures
    }

    /// 接管上次运行留在调度器队列中的同名作业，不重新提交
    ///
    /// 只有尚未提交的作业（VALID、WAITING_ON_INPUT）可以被接管。
    pub fn adopt(&mut self, external_id: ExternalJobId, status: JobStatus) -> bool {
        if self.submitted || !self.status.is_dispatchable() || !status.is_in_flight() {
            return false;
        }
        self.external_id = Some(external_id);
        self.submitted = true;
        self.set_status(JobStatus::Submitted);
        self.set_status(status);
        debug!("作业 {} 接管调度器中的 {} ({})", self.name(), external_id, status);
        true
    }

    /// 只有 COMPLETED 的作业才会执行完成回调
    pub async fn handle_completion(&self, gate: &dyn DataReadinessGate) -> OrchestratorResult<()> {
        if self.status != JobStatus::Completed {
            debug!("作业 {} 状态为 {}，跳过完成回调", self.name(), self.status);
            return Ok(());
        }
        self.strategy.handle_completion(&self.context(), gate).await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("start_year", &self.start_year)
            .field("end_year", &self.end_year)
            .field("status", &self.status)
            .field("external_id", &self.external_id)
            .field("depends_on", &self.depends_on)
            .field("submitted", &self.submitted)
            .finish()
    }
}
