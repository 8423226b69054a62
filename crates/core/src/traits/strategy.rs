use async_trait::async_trait;

use crate::{
    models::{ExecutionOutcome, JobContext, WorkKey},
    traits::{DataReadinessGate, SchedulerClient},
    OrchestratorResult,
};

/// 流水线各阶段需要实现的作业契约
#[async_trait]
pub trait JobStrategy: Send + Sync {
    /// 根据同一窗口内已声明的作业计算依赖的作业类型。
    /// 所需类型不存在时返回 `DependencyNotFound`，属于初始化致命错误。
    fn setup_dependencies(
        &self,
        ctx: &JobContext,
        siblings: &[WorkKey],
    ) -> OrchestratorResult<Vec<String>>;

    /// 所有输入已存在并已在本地就位时返回 true，不修改外部状态
    async fn prevalidate(&self, ctx: &JobContext) -> bool;

    /// 生成提交描述并提交；dry-run 时不提交，直接返回 `Skipped`
    async fn execute(
        &self,
        ctx: &JobContext,
        scheduler: &dyn SchedulerClient,
        dryrun: bool,
    ) -> OrchestratorResult<ExecutionOutcome>;

    /// 检查持久化输出，判断作业目标是否真正达成
    async fn postvalidate(&self, ctx: &JobContext) -> bool;

    /// 成功完成后的幂等副作用，例如把产出登记回数据清单
    async fn handle_completion(
        &self,
        ctx: &JobContext,
        gate: &dyn DataReadinessGate,
    ) -> OrchestratorResult<()>;

    /// 对比对象（如观测数据或另一个算例），没有时为 None
    fn comparison(&self) -> Option<&str> {
        None
    }
}
