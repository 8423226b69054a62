use async_trait::async_trait;

use crate::{
    models::{DataAvailability, FileDescriptor},
    OrchestratorResult,
};

/// 数据就绪判断接口（数据清单与传输子系统的边界）
#[async_trait]
pub trait DataReadinessGate: Send + Sync {
    /// 查询闭区间 [start_year, end_year] 的输入数据是否齐全
    async fn query(&self, start_year: i32, end_year: i32) -> OrchestratorResult<DataAvailability>;

    /// 作业完成后登记新产出的文件
    async fn register_produced_artifacts(
        &self,
        work_type: &str,
        files: Vec<FileDescriptor>,
    ) -> OrchestratorResult<()>;

    /// 正在进行的传输数量
    fn active_transfers(&self) -> usize {
        0
    }
}
