use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use orchestrator_core::{config::SchedulerConfig, OrchestratorError, OrchestratorResult};

/// 有界重试与线性退避：第 n 次失败后等待 n 个退避单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_retries, config.backoff_unit())
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }

    /// 执行操作；只有连接类错误会重试，其他错误立即返回
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        token: &CancellationToken,
        mut f: F,
    ) -> OrchestratorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if token.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} 在第 {} 次尝试时成功", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{} 第 {}/{} 次尝试失败: {}",
                        operation, attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                    if attempt == self.max_attempts {
                        break;
                    }
                    tokio::select! {
                        _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
                        _ = tokio::time::sleep(self.backoff_for(attempt)) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(OrchestratorError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
    }
}
