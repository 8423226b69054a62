//! Mock implementations for the collaborator traits
//!
//! In-memory test doubles that let tests drive the reconciliation loop
//! without a batch scheduler or a data inventory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator_core::{
    models::{
        DataAvailability, ExecutionOutcome, ExternalJobId, FileDescriptor, JobContext, JobStatus,
        QueueEntry, WorkKey,
    },
    traits::{DataReadinessGate, JobStrategy, SchedulerClient},
    OrchestratorError, OrchestratorResult,
};

#[derive(Debug)]
struct SchedulerState {
    next_id: ExternalJobId,
    nodes: usize,
    transient_submit_failures: u32,
    fatal_submit: bool,
    submissions: Vec<(ExternalJobId, PathBuf)>,
    submit_attempts: u32,
    statuses: HashMap<ExternalJobId, JobStatus>,
    lost: HashSet<ExternalJobId>,
    cancelled: Vec<ExternalJobId>,
    queries: u32,
    node_queries: u32,
}

/// Mock implementation of SchedulerClient for testing
///
/// 新提交的作业初始为 PENDING，由测试通过 `set_status*` 推进。
#[derive(Debug, Clone)]
pub struct MockSchedulerClient {
    state: Arc<Mutex<SchedulerState>>,
}

impl MockSchedulerClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                next_id: 1000,
                nodes: 1,
                transient_submit_failures: 0,
                fatal_submit: false,
                submissions: Vec::new(),
                submit_attempts: 0,
                statuses: HashMap::new(),
                lost: HashSet::new(),
                cancelled: Vec::new(),
                queries: 0,
                node_queries: 0,
            })),
        }
    }

    pub fn with_nodes(self, nodes: usize) -> Self {
        self.state.lock().unwrap().nodes = nodes;
        self
    }

    pub fn set_nodes(&self, nodes: usize) {
        self.state.lock().unwrap().nodes = nodes;
    }

    /// 接下来的 `count` 次提交返回连接类错误
    pub fn fail_next_submits(&self, count: u32) {
        self.state.lock().unwrap().transient_submit_failures = count;
    }

    /// 所有提交都返回非连接类错误
    pub fn reject_submits(&self, reject: bool) {
        self.state.lock().unwrap().fatal_submit = reject;
    }

    pub fn set_status(&self, id: ExternalJobId, status: JobStatus) {
        self.state.lock().unwrap().statuses.insert(id, status);
    }

    /// 设置脚本路径包含 `fragment` 的全部作业的状态，返回匹配数量
    pub fn set_status_where(&self, fragment: &str, status: JobStatus) -> usize {
        let mut state = self.state.lock().unwrap();
        let ids: Vec<ExternalJobId> = state
            .submissions
            .iter()
            .filter(|(_, path)| path.to_string_lossy().contains(fragment))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            state.statuses.insert(*id, status);
        }
        ids.len()
    }

    pub fn set_all_statuses(&self, status: JobStatus) {
        let mut state = self.state.lock().unwrap();
        for value in state.statuses.values_mut() {
            *value = status;
        }
    }

    /// 调度器不再认识该作业编号
    pub fn lose_job(&self, id: ExternalJobId) {
        self.state.lock().unwrap().lost.insert(id);
    }

    pub fn submissions(&self) -> Vec<(ExternalJobId, PathBuf)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    pub fn submit_attempts(&self) -> u32 {
        self.state.lock().unwrap().submit_attempts
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter_map(|(_, path)| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect()
    }

    pub fn cancelled(&self) -> Vec<ExternalJobId> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn query_count(&self) -> u32 {
        self.state.lock().unwrap().queries
    }

    pub fn node_query_count(&self) -> u32 {
        self.state.lock().unwrap().node_queries
    }
}

impl Default for MockSchedulerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerClient for MockSchedulerClient {
    async fn submit(&self, script: &Path) -> OrchestratorResult<ExternalJobId> {
        let mut state = self.state.lock().unwrap();
        state.submit_attempts += 1;
        if state.fatal_submit {
            return Err(OrchestratorError::scheduler_error("sbatch: error: invalid partition"));
        }
        if state.transient_submit_failures > 0 {
            state.transient_submit_failures -= 1;
            return Err(OrchestratorError::transport_error(
                "Transport endpoint is not connected",
            ));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.submissions.push((id, script.to_path_buf()));
        state.statuses.insert(id, JobStatus::Pending);
        Ok(id)
    }

    async fn query(&self, id: ExternalJobId) -> OrchestratorResult<JobStatus> {
        let mut state = self.state.lock().unwrap();
        state.queries += 1;
        if state.lost.contains(&id) {
            return Err(OrchestratorError::SchedulerJobNotFound { id });
        }
        state
            .statuses
            .get(&id)
            .copied()
            .ok_or(OrchestratorError::SchedulerJobNotFound { id })
    }

    async fn list_queue(&self) -> OrchestratorResult<Vec<QueueEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .submissions
            .iter()
            .filter_map(|(id, path)| {
                if state.lost.contains(id) {
                    return None;
                }
                let status = state.statuses.get(id).copied()?;
                let name = path.file_stem()?.to_string_lossy().to_string();
                status.is_in_flight().then(|| QueueEntry {
                    id: *id,
                    name,
                    state: status.as_str().to_string(),
                    status,
                })
            })
            .collect())
    }

    async fn cancel(&self, id: ExternalJobId) -> OrchestratorResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(id);
        Ok(state.statuses.insert(id, JobStatus::Cancelled).is_some())
    }

    async fn node_count(&self) -> OrchestratorResult<usize> {
        let mut state = self.state.lock().unwrap();
        state.node_queries += 1;
        Ok(state.nodes)
    }
}

#[derive(Debug, Default)]
struct GateState {
    default: Option<DataAvailability>,
    windows: HashMap<(i32, i32), DataAvailability>,
    registered: Vec<(String, Vec<FileDescriptor>)>,
    queries: u32,
}

/// Mock implementation of DataReadinessGate for testing
///
/// 默认所有窗口数据齐全。
#[derive(Debug, Clone, Default)]
pub struct MockReadinessGate {
    state: Arc<Mutex<GateState>>,
}

impl MockReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(self, availability: DataAvailability) -> Self {
        self.state.lock().unwrap().default = Some(availability);
        self
    }

    pub fn set_availability(&self, start_year: i32, end_year: i32, availability: DataAvailability) {
        self.state
            .lock()
            .unwrap()
            .windows
            .insert((start_year, end_year), availability);
    }

    pub fn registered(&self) -> Vec<(String, Vec<FileDescriptor>)> {
        self.state.lock().unwrap().registered.clone()
    }

    pub fn query_count(&self) -> u32 {
        self.state.lock().unwrap().queries
    }
}

#[async_trait]
impl DataReadinessGate for MockReadinessGate {
    async fn query(&self, start_year: i32, end_year: i32) -> OrchestratorResult<DataAvailability> {
        let mut state = self.state.lock().unwrap();
        state.queries += 1;
        Ok(state
            .windows
            .get(&(start_year, end_year))
            .copied()
            .or(state.default)
            .unwrap_or(DataAvailability::All))
    }

    async fn register_produced_artifacts(
        &self,
        work_type: &str,
        files: Vec<FileDescriptor>,
    ) -> OrchestratorResult<()> {
        self.state
            .lock()
            .unwrap()
            .registered
            .push((work_type.to_string(), files));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StrategyState {
    inputs_missing: HashSet<String>,
    outputs_present: HashSet<String>,
    outputs_broken: HashSet<String>,
    submitted: HashSet<String>,
    executions: Vec<String>,
    completions: Vec<String>,
}

/// Mock implementation of JobStrategy for testing
///
/// 作业名（如 `climo_0001_0005`）作为控制键：
/// 提交过的作业在 postvalidate 中视为输出已存在，除非被 `break_outputs` 标记。
#[derive(Debug, Clone, Default)]
pub struct MockStrategy {
    depends_on: Vec<String>,
    comparison: Option<String>,
    state: Arc<Mutex<StrategyState>>,
}

impl MockStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependencies(mut self, depends_on: &[&str]) -> Self {
        self.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_comparison(mut self, comparison: &str) -> Self {
        self.comparison = Some(comparison.to_string());
        self
    }

    pub fn set_inputs_missing(&self, job_name: &str, missing: bool) {
        let mut state = self.state.lock().unwrap();
        if missing {
            state.inputs_missing.insert(job_name.to_string());
        } else {
            state.inputs_missing.remove(job_name);
        }
    }

    /// 作业执行前输出就已存在
    pub fn mark_outputs_present(&self, job_name: &str) {
        self.state
            .lock()
            .unwrap()
            .outputs_present
            .insert(job_name.to_string());
    }

    /// 不论调度器如何报告，输出校验都失败
    pub fn break_outputs(&self, job_name: &str) {
        self.state
            .lock()
            .unwrap()
            .outputs_broken
            .insert(job_name.to_string());
    }

    pub fn executions(&self) -> Vec<String> {
        self.state.lock().unwrap().executions.clone()
    }

    pub fn completions(&self) -> Vec<String> {
        self.state.lock().unwrap().completions.clone()
    }
}

#[async_trait]
impl JobStrategy for MockStrategy {
    fn setup_dependencies(
        &self,
        ctx: &JobContext,
        siblings: &[WorkKey],
    ) -> OrchestratorResult<Vec<String>> {
        for dependency in &self.depends_on {
            if !siblings.iter().any(|key| &key.work_type == dependency) {
                return Err(OrchestratorError::dependency_not_found(
                    ctx.work_type(),
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
        !self
            .state
            .lock()
            .unwrap()
            .inputs_missing
            .contains(&ctx.job_name())
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        scheduler: &dyn SchedulerClient,
        dryrun: bool,
    ) -> OrchestratorResult<ExecutionOutcome> {
        let name = ctx.job_name();
        self.state.lock().unwrap().executions.push(name.clone());
        if dryrun {
            return Ok(ExecutionOutcome::Skipped);
        }
        let script = PathBuf::from(format!("scripts/{name}.sh"));
        let id = scheduler.submit(&script).await?;
        self.state.lock().unwrap().submitted.insert(name);
        Ok(ExecutionOutcome::Submitted(id))
    }

    async fn postvalidate(&self, ctx: &JobContext) -> bool {
        let name = ctx.job_name();
        let state = self.state.lock().unwrap();
        if state.outputs_broken.contains(&name) {
            return false;
        }
        state.outputs_present.contains(&name) || state.submitted.contains(&name)
    }

    async fn handle_completion(
        &self,
        ctx: &JobContext,
        gate: &dyn DataReadinessGate,
    ) -> OrchestratorResult<()> {
        let name = ctx.job_name();
        self.state.lock().unwrap().completions.push(name.clone());
        gate.register_produced_artifacts(
            ctx.work_type(),
            vec![FileDescriptor {
                path: PathBuf::from(format!("{name}.nc")),
                size: 0,
            }],
        )
        .await
    }

    fn comparison(&self) -> Option<&str> {
        self.comparison.as_deref()
    }
}
