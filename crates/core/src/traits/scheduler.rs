use std::path::Path;

use async_trait::async_trait;

use crate::{
    models::{ExternalJobId, JobStatus, QueueEntry},
    OrchestratorResult,
};

/// 外部批处理调度器客户端接口
///
/// 实现方负责统一的重试：连接类错误按线性退避重试，其他错误立即返回。
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// 提交作业脚本，返回外部作业编号
    async fn submit(&self, script: &Path) -> OrchestratorResult<ExternalJobId>;

    /// 查询作业状态，调度器已不认识该编号时返回 `SchedulerJobNotFound`
    async fn query(&self, id: ExternalJobId) -> OrchestratorResult<JobStatus>;

    /// 列出当前队列
    async fn list_queue(&self) -> OrchestratorResult<Vec<QueueEntry>>;

    /// 取消作业
    async fn cancel(&self, id: ExternalJobId) -> OrchestratorResult<bool>;

    /// 可用节点数量
    async fn node_count(&self) -> OrchestratorResult<usize>;
}
