use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use orchestrator_core::{
    config::AppConfig,
    models::{ExecutionOutcome, ExternalJobId, JobStatus, SetStatus},
    traits::{DataReadinessGate, SchedulerClient},
    OrchestratorError, OrchestratorResult, StructuredLogger,
};
use orchestrator_domain::{build_windows, Job, StageRegistry, TimeWindow};

use crate::dependency_checker::DependencyChecker;
use crate::state_snapshot::{RunSnapshot, StateSnapshotWriter, WindowSnapshot};

/// 作业在窗口集合中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLocator {
    pub window: usize,
    pub slot: usize,
}

/// `is_all_done` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Failed,
    Succeeded,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

/// 一次运行的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Interrupted => 3,
        }
    }
}

/// 协调循环：刷新数据就绪、分派、轮询、完成处理
///
/// 窗口与作业只由这里修改；其他任务通过 [`RunManager::snapshot_handle`]
/// 读取每轮发布的快照。
pub struct RunManager {
    config: Arc<AppConfig>,
    scheduler: Arc<dyn SchedulerClient>,
    gate: Arc<dyn DataReadinessGate>,
    windows: Vec<TimeWindow>,
    in_flight: Vec<JobLocator>,
    submitted_this_pass: Vec<JobLocator>,
    total_jobs: usize,
    completed_jobs: usize,
    max_running_jobs: usize,
    pass: u64,
    dependency_checker: DependencyChecker,
    snapshot_writer: StateSnapshotWriter,
    published: Arc<RwLock<RunSnapshot>>,
}

impl RunManager {
    pub fn new(
        config: Arc<AppConfig>,
        mut windows: Vec<TimeWindow>,
        scheduler: Arc<dyn SchedulerClient>,
        gate: Arc<dyn DataReadinessGate>,
    ) -> Self {
        for window in windows.iter_mut().filter(|w| w.is_empty()) {
            window.reconcile_from_jobs();
        }
        let total_jobs = windows.iter().map(|w| w.jobs().len()).sum();
        let snapshot_writer = StateSnapshotWriter::new(config.run.state_path());

        Self {
            config,
            scheduler,
            gate,
            windows,
            in_flight: Vec::new(),
            submitted_this_pass: Vec::new(),
            total_jobs,
            completed_jobs: 0,
            max_running_jobs: 0,
            pass: 0,
            dependency_checker: DependencyChecker::new(),
            snapshot_writer,
            published: Arc::new(RwLock::new(RunSnapshot::default())),
        }
    }

    /// 由配置构建全部窗口与作业，任何初始化错误都直接返回
    pub async fn setup(
        config: Arc<AppConfig>,
        registry: &StageRegistry,
        scheduler: Arc<dyn SchedulerClient>,
        gate: Arc<dyn DataReadinessGate>,
    ) -> OrchestratorResult<Self> {
        DependencyChecker::new().validate_stage_graph(&config.stages)?;
        let windows = build_windows(&config, registry)?;

        let mut manager = Self::new(config, windows, scheduler, gate);
        manager.refresh_capacity().await;
        info!(
            "编排器初始化完成: {} 个窗口, {} 个作业, 并发上限 {}",
            manager.windows.len(),
            manager.total_jobs,
            manager.max_running_jobs
        );
        Ok(manager)
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }
    pub fn window(&self, index: usize) -> Option<&TimeWindow> {
        self.windows.get(index)
    }
    pub fn job(&self, locator: JobLocator) -> Option<&Job> {
        self.windows.get(locator.window)?.job(locator.slot)
    }
    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }
    pub fn completed_jobs(&self) -> usize {
        self.completed_jobs
    }
    pub fn max_running_jobs(&self) -> usize {
        self.max_running_jobs
    }
    pub fn pass(&self) -> u64 {
        self.pass
    }
    pub fn in_flight(&self) -> Vec<JobLocator> {
        self.in_flight
            .iter()
            .chain(self.submitted_this_pass.iter())
            .copied()
            .collect()
    }
    pub fn snapshot_handle(&self) -> Arc<RwLock<RunSnapshot>> {
        Arc::clone(&self.published)
    }

    /// 已提交且未结束的作业数量（SUBMITTED、PENDING、RUNNING）
    pub fn active_job_count(&self) -> usize {
        self.windows
            .iter()
            .flat_map(|w| w.jobs())
            .filter(|job| job.status().is_in_flight())
            .count()
    }

    /// 并发上限 = 节点数 × 每节点作业数；调度器报告 0 个节点时每轮重新查询
    ///
    /// dry-run 不占用调度器资源，不查询节点也不受上限约束。
    pub async fn refresh_capacity(&mut self) {
        if self.config.run.dryrun || self.max_running_jobs > 0 {
            return;
        }
        match self.scheduler.node_count().await {
            Ok(nodes) => {
                self.max_running_jobs = nodes * self.config.run.jobs_per_node;
                if self.max_running_jobs == 0 {
                    warn!("调度器报告可用节点数为 0，本轮不分派作业");
                } else {
                    debug!("并发上限: {} 个节点 × {} = {}", nodes, self.config.run.jobs_per_node, self.max_running_jobs);
                }
            }
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "node_count", &e);
            }
        }
    }

    /// 接管上次运行遗留在调度器队列中的作业，按作业名匹配，返回接管数量
    ///
    /// 队列查询失败时不接管，作业按正常流程分派。
    pub async fn adopt_queued_jobs(&mut self) -> usize {
        let entries = match self.scheduler.list_queue().await {
            Ok(entries) => entries,
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "list_queue", &e);
                return 0;
            }
        };
        let queued: HashMap<String, (ExternalJobId, JobStatus)> = entries
            .into_iter()
            .filter(|entry| entry.status.is_in_flight())
            .map(|entry| (entry.name, (entry.id, entry.status)))
            .collect();
        if queued.is_empty() {
            return 0;
        }

        let mut adopted = 0;
        for (window_index, window) in self.windows.iter_mut().enumerate() {
            let mut running = false;
            for (slot, job) in window.jobs_mut().iter_mut().enumerate() {
                let Some(&(external_id, status)) = queued.get(&job.name()) else {
                    continue;
                };
                if job.adopt(external_id, status) {
                    running |= status == JobStatus::Running;
                    self.in_flight.push(JobLocator {
                        window: window_index,
                        slot,
                    });
                    adopted += 1;
                }
            }
            if running {
                window.set_status(SetStatus::Running);
            }
        }

        if adopted > 0 {
            info!("接管调度器队列中的 {} 个作业", adopted);
        }
        adopted
    }

    /// 第 1 步：刷新非终态窗口的数据就绪状态
    pub async fn refresh_readiness(&mut self) {
        let gate = Arc::clone(&self.gate);
        for window in self.windows.iter_mut() {
            if window.status().is_terminal() {
                continue;
            }
            if let Err(e) = window.refresh_status(gate.as_ref()).await {
                warn!("刷新窗口 {} 的数据状态失败: {}", window.label(), e);
            }
        }
    }

    /// 第 2 步：分派依赖已满足且数据就绪的作业，返回本次执行过的作业数
    pub async fn dispatch_ready_jobs(&mut self) -> usize {
        let scheduler = Arc::clone(&self.scheduler);
        let dryrun = self.config.run.dryrun;
        let mut dispatched = 0;

        for window_index in 0..self.windows.len() {
            if !self.windows[window_index].status().accepts_dispatch() {
                continue;
            }

            for slot in 0..self.windows[window_index].jobs().len() {
                let locator = JobLocator {
                    window: window_index,
                    slot,
                };
                let window = &self.windows[window_index];
                let job = &window.jobs()[slot];

                match job.status() {
                    JobStatus::Invalid => {
                        debug!("作业 {} 无效，跳过", job.name());
                        continue;
                    }
                    status if !status.is_dispatchable() => continue,
                    _ => {}
                }

                let dependencies = self.dependency_checker.check(window, job);
                if !dependencies.can_execute {
                    debug!(
                        "作业 {} 等待依赖完成: {}",
                        job.name(),
                        dependencies.blocking_dependencies.join(", ")
                    );
                    continue;
                }

                if !dryrun && self.active_job_count() >= self.max_running_jobs {
                    debug!(
                        "运行中作业已达上限 {}，本轮停止分派",
                        self.max_running_jobs
                    );
                    return dispatched;
                }

                let job = &mut self.windows[window_index].jobs_mut()[slot];
                match job.execute(scheduler.as_ref(), dryrun).await {
                    Ok(ExecutionOutcome::Submitted(_)) => {
                        dispatched += 1;
                        self.submitted_this_pass.push(locator);
                    }
                    Ok(ExecutionOutcome::Skipped) => {
                        dispatched += 1;
                        self.completed_jobs += 1;
                        self.handle_completed_job(locator).await;
                    }
                    Ok(ExecutionOutcome::Deferred) => {}
                    Err(OrchestratorError::Cancelled) => {
                        info!("收到关闭信号，停止分派");
                        return dispatched;
                    }
                    Err(e) => {
                        let failures = job.record_submission_failure();
                        StructuredLogger::log_submission_failure(
                            &job.context(),
                            failures,
                            self.config.run.submission_failure_watermark,
                            &e,
                        );
                    }
                }
            }
        }
        dispatched
    }

    /// 第 3 步：轮询上一轮之前提交的作业
    ///
    /// 本轮刚提交的作业在轮询结束后才并入在途集合，下一轮才会被查询。
    pub async fn poll_in_flight(&mut self) {
        let scheduler = Arc::clone(&self.scheduler);
        let mut remaining = Vec::with_capacity(self.in_flight.len());
        let mut queue = std::mem::take(&mut self.in_flight).into_iter();

        while let Some(locator) = queue.next() {
            let Some(job) = self.windows[locator.window].job(locator.slot) else {
                continue;
            };
            let current = job.status();
            let Some(external_id) = job.external_id() else {
                warn!("在途作业 {} 没有外部编号", job.name());
                continue;
            };

            let next = match scheduler.query(external_id).await {
                Ok(status) => status,
                Err(OrchestratorError::Cancelled) => {
                    remaining.push(locator);
                    remaining.extend(queue.by_ref());
                    break;
                }
                Err(e) => {
                    if job.postvalidate().await {
                        info!(
                            "调度器查询作业 {} 失败，但输出校验通过，视为完成",
                            job.name()
                        );
                        JobStatus::Completed
                    } else {
                        warn!("查询作业 {} ({}) 失败: {}", job.name(), external_id, e);
                        remaining.push(locator);
                        continue;
                    }
                }
            };

            if next == current {
                remaining.push(locator);
                continue;
            }

            let window = &mut self.windows[locator.window];
            let Some(job) = window.job_mut(locator.slot) else {
                continue;
            };
            if !job.set_status(next) {
                remaining.push(locator);
                continue;
            }

            match next {
                JobStatus::Running => {
                    job.mark_started(Utc::now());
                    if window.status() != SetStatus::Failed {
                        window.set_status(SetStatus::Running);
                    }
                    remaining.push(locator);
                }
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                    job.mark_ended(Utc::now());
                    self.completed_jobs += 1;
                    self.handle_completed_job(locator).await;
                }
                _ => remaining.push(locator),
            }
        }

        remaining.append(&mut self.submitted_this_pass);
        self.in_flight = remaining;
    }

    /// 第 4 步：完成处理
    ///
    /// 调度器报告完成后仍以输出校验为准。dry-run 下作业从未真正运行，
    /// 既不做输出校验也不登记产出。
    pub async fn handle_completed_job(&mut self, locator: JobLocator) {
        let dryrun = self.config.run.dryrun;
        let gate = Arc::clone(&self.gate);
        let window = &mut self.windows[locator.window];
        let label = window.label();
        let Some(job) = window.job_mut(locator.slot) else {
            return;
        };

        if job.status() == JobStatus::Completed && !dryrun && !job.postvalidate().await {
            warn!("作业 {} 报告完成但输出校验失败", job.name());
            job.set_status(JobStatus::Failed);
        }

        let status = job.status();
        if !dryrun {
            if let Err(e) = job.handle_completion(gate.as_ref()).await {
                error!("作业 {} 的完成回调失败: {}", job.name(), e);
            }
        }

        if status.is_failure() {
            warn!("窗口 {} 中的作业失败", label);
        }
        window.reconcile_from_jobs();
    }

    /// 第 5 步：全局终止判断
    pub fn is_all_done(&self) -> RunState {
        let mut failed = false;
        for window in &self.windows {
            if window.has_in_flight() {
                return RunState::Running;
            }
            if window.is_empty() {
                continue;
            }
            match window.status() {
                SetStatus::Completed => {}
                SetStatus::Failed => failed = true,
                _ => return RunState::Running,
            }
        }
        if failed {
            RunState::Failed
        } else {
            RunState::Succeeded
        }
    }

    /// 执行一轮完整的协调并发布快照
    ///
    /// 第一轮先接管调度器队列中同名的作业，已接管的作业不会再次提交。
    pub async fn run_pass(&mut self) -> RunState {
        self.pass += 1;
        if self.pass == 1 && !self.config.run.dryrun {
            self.adopt_queued_jobs().await;
        }
        self.refresh_readiness().await;
        self.refresh_capacity().await;
        self.dispatch_ready_jobs().await;
        self.poll_in_flight().await;

        let state = self.is_all_done();
        self.publish().await;
        StructuredLogger::log_pass_summary(
            self.pass,
            self.completed_jobs,
            self.total_jobs,
            self.in_flight.len(),
        );
        state
    }

    /// 循环执行直到全部窗口进入终态或收到关闭信号
    ///
    /// 关闭时只停止分派，已提交的作业留在调度器中，下次启动时通过查询与输出校验恢复。
    pub async fn run(&mut self, shutdown: CancellationToken) -> RunOutcome {
        let poll_interval = self.config.run.poll_interval();
        info!("开始协调循环，轮询间隔 {:?}", poll_interval);

        let outcome = loop {
            if shutdown.is_cancelled() {
                break RunOutcome::Interrupted;
            }
            match self.run_pass().await {
                RunState::Succeeded => break RunOutcome::Succeeded,
                RunState::Failed => break RunOutcome::Failed,
                RunState::Running => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break RunOutcome::Interrupted,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        };

        self.publish().await;
        match outcome {
            RunOutcome::Succeeded => info!("所有时间窗口已完成"),
            RunOutcome::Failed => warn!("运行结束，存在失败的时间窗口"),
            RunOutcome::Interrupted => warn!(
                "协调循环被中断，{} 个在途作业保留在调度器中",
                self.in_flight().len()
            ),
        }
        outcome
    }

    /// 取消所有在途作业（运维操作，关闭时不会调用），返回调度器确认取消的数量
    pub async fn cancel_in_flight(&self) -> usize {
        let mut cancelled = 0;
        for locator in self.in_flight() {
            let Some(job) = self.job(locator) else {
                continue;
            };
            let Some(external_id) = job.external_id() else {
                continue;
            };
            match self.scheduler.cancel(external_id).await {
                Ok(true) => {
                    info!("已取消作业 {} ({})", job.name(), external_id);
                    cancelled += 1;
                }
                Ok(false) => warn!("调度器未能取消作业 {} ({})", job.name(), external_id),
                Err(e) => warn!("取消作业 {} ({}) 失败: {}", job.name(), external_id, e),
            }
        }
        cancelled
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            pass: self.pass,
            generated_at: Utc::now(),
            total_jobs: self.total_jobs,
            completed_jobs: self.completed_jobs,
            in_flight: self.active_job_count(),
            max_running_jobs: self.max_running_jobs,
            submission_failure_watermark: self.config.run.submission_failure_watermark,
            windows: self.windows.iter().map(WindowSnapshot::from).collect(),
        }
    }

    /// 发布快照并写入状态文件；写锁只在替换快照时持有
    async fn publish(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.snapshot_writer.write(&snapshot).await {
            StructuredLogger::log_system_error("state_snapshot", "write", &e);
        }
        *self.published.write().await = snapshot;
    }
}
