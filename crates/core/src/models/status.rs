use std::fmt;

use serde::{Deserialize, Serialize};

/// 作业状态
///
/// 状态之间的顺序只表示合法性，不表示时间先后。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "VALID")]
    Valid,
    #[serde(rename = "INVALID")]
    Invalid,
    #[serde(rename = "WAITING_ON_INPUT")]
    WaitingOnInput,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Valid => "VALID",
            JobStatus::Invalid => "INVALID",
            JobStatus::WaitingOnInput => "WAITING_ON_INPUT",
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
    /// 已提交给外部调度器且尚未结束
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::Pending | JobStatus::Running
        )
    }
    /// 可以被分派（执行）的状态
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, JobStatus::Valid | JobStatus::WaitingOnInput)
    }

    /// 状态机合法转换
    ///
    /// 回退边只有 WAITING_ON_INPUT -> VALID 与提交失败后的 VALID -> VALID。
    /// COMPLETED 只能被输出校验推翻为 FAILED。
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Valid, WaitingOnInput | Submitted | Completed | Invalid) => true,
            (WaitingOnInput, Valid | Submitted | Completed | Invalid) => true,
            (Invalid, Valid) => true,
            (Submitted, Pending | Running | Completed | Failed | Cancelled) => true,
            (Pending, Running | Completed | Failed | Cancelled) => true,
            (Running, Pending | Completed | Failed | Cancelled) => true,
            (Completed, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 时间窗口（year set）状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SetStatus {
    #[serde(rename = "NO_DATA")]
    NoData,
    #[serde(rename = "PARTIAL_DATA")]
    PartialData,
    #[serde(rename = "DATA_READY")]
    DataReady,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl SetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetStatus::NoData => "NO_DATA",
            SetStatus::PartialData => "PARTIAL_DATA",
            SetStatus::DataReady => "DATA_READY",
            SetStatus::Running => "RUNNING",
            SetStatus::Completed => "COMPLETED",
            SetStatus::Failed => "FAILED",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, SetStatus::Completed | SetStatus::Failed)
    }
    /// 数据可用性查询不会覆盖这些状态
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            SetStatus::Running | SetStatus::Completed | SetStatus::Failed
        )
    }
    /// 分派阶段需要遍历的窗口状态，FAILED 窗口仍需处理已就绪的作业
    pub fn accepts_dispatch(&self) -> bool {
        matches!(
            self,
            SetStatus::DataReady | SetStatus::Running | SetStatus::Failed
        )
    }
}

impl fmt::Display for SetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 数据就绪查询结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataAvailability {
    None,
    Partial,
    All,
}

impl From<DataAvailability> for SetStatus {
    fn from(availability: DataAvailability) -> Self {
        match availability {
            DataAvailability::None => SetStatus::NoData,
            DataAvailability::Partial => SetStatus::PartialData,
            DataAvailability::All => SetStatus::DataReady,
        }
    }
}
