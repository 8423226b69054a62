use thiserror::Error;

/// 编排器错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("依赖未找到: 窗口 {window} 中的 {work_type} 依赖 {missing}，但该类型未配置")]
    DependencyNotFound {
        work_type: String,
        missing: String,
        window: String,
    },

    #[error("重复的作业: 窗口 {window} 已包含 {work_type}{}", fmt_subtype(.subtype))]
    DuplicateJob {
        work_type: String,
        subtype: Option<String>,
        window: String,
    },

    #[error("未注册的作业类型: {0}")]
    UnknownWorkType(String),

    #[error("无效的时间窗口配置: {0}")]
    InvalidWindowConfig(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("调度器连接错误: {0}")]
    SchedulerTransport(String),

    #[error("调度器错误: {0}")]
    Scheduler(String),

    #[error("调度器中未找到作业: {id}")]
    SchedulerJobNotFound { id: u64 },

    #[error("{operation} 重试 {attempts} 次后仍失败: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("操作已取消")]
    Cancelled,

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

fn fmt_subtype(subtype: &Option<String>) -> String {
    subtype
        .as_deref()
        .map(|s| format!(" ({s})"))
        .unwrap_or_default()
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn dependency_not_found(
        work_type: impl Into<String>,
        missing: impl Into<String>,
        window: impl Into<String>,
    ) -> Self {
        Self::DependencyNotFound {
            work_type: work_type.into(),
            missing: missing.into(),
            window: window.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn scheduler_error<S: Into<String>>(msg: S) -> Self {
        Self::Scheduler(msg.into())
    }
    pub fn transport_error<S: Into<String>>(msg: S) -> Self {
        Self::SchedulerTransport(msg.into())
    }

    /// 仅连接类错误可以在调度器客户端内部重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::SchedulerTransport(_))
    }

    /// 初始化阶段的致命错误，直接中止编排器构建
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::DependencyNotFound { .. }
                | OrchestratorError::DuplicateJob { .. }
                | OrchestratorError::UnknownWorkType(_)
                | OrchestratorError::InvalidWindowConfig(_)
                | OrchestratorError::Configuration(_)
        )
    }

    /// 调度器调用失败（提交失败由编排器降级为 VALID 重试）
    pub fn is_scheduler_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::SchedulerTransport(_)
                | OrchestratorError::Scheduler(_)
                | OrchestratorError::SchedulerJobNotFound { .. }
                | OrchestratorError::RetriesExhausted { .. }
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(OrchestratorError::transport_error("Socket timed out").is_retryable());
        assert!(!OrchestratorError::scheduler_error("Invalid partition").is_retryable());
        assert!(OrchestratorError::dependency_not_found("e3sm_diags", "climo", "1").is_setup_fatal());
        assert!(OrchestratorError::InvalidWindowConfig("freq=0".into()).is_setup_fatal());
        assert!(!OrchestratorError::Cancelled.is_setup_fatal());
        assert!(OrchestratorError::SchedulerJobNotFound { id: 7 }.is_scheduler_failure());
    }

    #[test]
    fn test_duplicate_job_message_includes_subtype() {
        let err = OrchestratorError::DuplicateJob {
            work_type: "regrid".into(),
            subtype: Some("atm".into()),
            window: "2".into(),
        };
        assert!(err.to_string().contains("regrid (atm)"));
    }
}
