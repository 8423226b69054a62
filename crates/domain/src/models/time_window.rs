use tracing::debug;

use orchestrator_core::{
    models::{JobStatus, SetStatus, WorkKey},
    traits::DataReadinessGate,
    OrchestratorError, OrchestratorResult, StructuredLogger,
};

use super::Job;

/// 一段连续的闭区间模拟年份，以及作用于这段年份的全部作业
#[derive(Debug)]
pub struct TimeWindow {
    ordinal: usize,
    start_year: i32,
    end_year: i32,
    status: SetStatus,
    jobs: Vec<Job>,
}

impl TimeWindow {
    pub fn new(ordinal: usize, start_year: i32, end_year: i32) -> OrchestratorResult<Self> {
        if end_year < start_year {
            return Err(OrchestratorError::InvalidWindowConfig(format!(
                "窗口 {ordinal} 的结束年份 {end_year} 早于开始年份 {start_year}"
            )));
        }
        Ok(Self {
            ordinal,
            start_year,
            end_year,
            status: SetStatus::NoData,
            jobs: Vec::new(),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
    pub fn start_year(&self) -> i32 {
        self.start_year
    }
    pub fn end_year(&self) -> i32 {
        self.end_year
    }
    pub fn length(&self) -> i32 {
        self.end_year - self.start_year + 1
    }
    pub fn status(&self) -> SetStatus {
        self.status
    }
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }
    pub fn jobs_mut(&mut self) -> &mut [Job] {
        &mut self.jobs
    }
    pub fn job(&self, slot: usize) -> Option<&Job> {
        self.jobs.get(slot)
    }
    pub fn job_mut(&mut self, slot: usize) -> Option<&mut Job> {
        self.jobs.get_mut(slot)
    }
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// `3 [0006-0010]`
    pub fn label(&self) -> String {
        format!(
            "{} [{:04}-{:04}]",
            self.ordinal, self.start_year, self.end_year
        )
    }

    /// 追加作业，同一 (作业类型, 数据子类型) 只能出现一次
    pub fn add_job(&mut self, job: Job) -> OrchestratorResult<()> {
        if self.jobs.iter().any(|existing| existing.key() == job.key()) {
            return Err(OrchestratorError::DuplicateJob {
                work_type: job.work_type().to_string(),
                subtype: job.data_subtype().map(str::to_string),
                window: self.label(),
            });
        }
        self.jobs.push(job);
        Ok(())
    }

    /// 声明顺序的兄弟作业键
    pub fn keys(&self) -> Vec<WorkKey> {
        self.jobs.iter().map(|job| job.key().clone()).collect()
    }

    /// 所有作业建立依赖关系，任一失败即返回
    pub fn setup_dependencies(&mut self) -> OrchestratorResult<()> {
        let siblings = self.keys();
        for job in &mut self.jobs {
            job.setup_dependencies(&siblings)?;
        }
        Ok(())
    }

    pub fn set_status(&mut self, status: SetStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        StructuredLogger::log_window_status(self.ordinal, self.start_year, self.end_year, status);
    }

    /// 根据数据就绪情况刷新状态，RUNNING/COMPLETED/FAILED 不会被覆盖
    pub async fn refresh_status(&mut self, gate: &dyn DataReadinessGate) -> OrchestratorResult<()> {
        if self.status.is_sticky() {
            return Ok(());
        }
        let availability = gate.query(self.start_year, self.end_year).await?;
        debug!("窗口 {} 数据可用性: {:?}", self.label(), availability);
        self.set_status(availability.into());
        Ok(())
    }

    /// 窗口内某作业类型的全部实例是否都已完成（至少存在一个实例）
    pub fn dependency_satisfied(&self, work_type: &str) -> bool {
        let mut matching = self
            .jobs
            .iter()
            .filter(|job| job.work_type() == work_type)
            .peekable();
        matching.peek().is_some() && matching.all(|job| job.status() == JobStatus::Completed)
    }

    pub fn all_jobs_completed(&self) -> bool {
        self.jobs.iter().all(|job| job.status() == JobStatus::Completed)
    }

    pub fn has_failed_job(&self) -> bool {
        self.jobs.iter().any(|job| job.status().is_failure())
    }

    pub fn has_in_flight(&self) -> bool {
        self.jobs.iter().any(|job| job.status().is_in_flight())
    }

    /// 从作业状态重新推导窗口的终态：全部完成则 COMPLETED，出现失败则 FAILED
    pub fn reconcile_from_jobs(&mut self) {
        if self.all_jobs_completed() {
            self.set_status(SetStatus::Completed);
        } else if self.has_failed_job() {
            self.set_status(SetStatus::Failed);
        }
    }
}
