use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 批处理调度器客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 每次调用的最大尝试次数
    pub max_retries: u32,
    /// 线性退避单位（毫秒），第 n 次重试前等待 n 个单位
    pub backoff_unit_ms: u64,
    pub partition: Option<String>,
    pub account: Option<String>,
    /// 列队列时过滤的用户
    pub user: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_unit_ms: 1000,
            partition: None,
            account: None,
            user: None,
        }
    }
}

impl SchedulerConfig {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("调度器最大重试次数必须大于0"));
        }
        Ok(())
    }
}
