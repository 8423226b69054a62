use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobStatus;

/// 外部调度器分配的作业编号
pub type ExternalJobId = u64;

/// 作业在窗口内的唯一键：(作业类型, 可选的数据子类型)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkKey {
    pub work_type: String,
    pub data_subtype: Option<String>,
}

impl WorkKey {
    pub fn new(work_type: impl Into<String>, data_subtype: Option<String>) -> Self {
        Self {
            work_type: work_type.into(),
            data_subtype,
        }
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data_subtype {
            Some(subtype) => write!(f, "{}/{}", self.work_type, subtype),
            None => f.write_str(&self.work_type),
        }
    }
}

/// 传给作业策略的只读上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: Uuid,
    pub key: WorkKey,
    pub start_year: i32,
    pub end_year: i32,
    pub window_ordinal: usize,
}

impl JobContext {
    pub fn work_type(&self) -> &str {
        &self.key.work_type
    }
    pub fn data_subtype(&self) -> Option<&str> {
        self.key.data_subtype.as_deref()
    }
    /// 形如 `climo_0001_0005` 或 `regrid_atm_0001_0005` 的作业名
    pub fn job_name(&self) -> String {
        match self.data_subtype() {
            Some(subtype) => format!(
                "{}_{}_{:04}_{:04}",
                self.key.work_type, subtype, self.start_year, self.end_year
            ),
            None => format!(
                "{}_{:04}_{:04}",
                self.key.work_type, self.start_year, self.end_year
            ),
        }
    }
}

/// execute 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// 已提交，携带外部作业编号
    Submitted(ExternalJobId),
    /// 输出已存在（或 dry-run），无需提交
    Skipped,
    /// 输入数据不足，等待后续轮次
    Deferred,
}

/// 产出文件描述，回写到数据清单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
}

/// 调度器队列条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: ExternalJobId,
    pub name: String,
    pub state: String,
    pub status: JobStatus,
}
