use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 后台任务的统一管理：同一个取消令牌，关闭时限时等待
pub struct TaskSupervisor {
    tasks: JoinSet<()>,
    token: CancellationToken,
}

impl TaskSupervisor {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 启动后台任务，任务收到一个子令牌用于感知关闭
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = task(self.token.child_token());
        self.tasks.spawn(async move {
            fut.await;
            debug!("后台任务 {} 已退出", name);
        });
        debug!("后台任务 {} 已启动", name);
    }

    /// 取消全部任务并等待退出，超时后强制中止剩余任务
    pub async fn shutdown(mut self, timeout: Duration) {
        self.token.cancel();
        let remaining = self.tasks.len();
        if remaining == 0 {
            return;
        }
        info!("等待 {} 个后台任务退出", remaining);

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        warn!("后台任务异常退出: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "后台任务在 {:?} 内未全部退出，强制中止剩余 {} 个",
                timeout,
                self.tasks.len()
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        } else {
            info!("所有后台任务已退出");
        }
    }
}
