use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 优雅关闭管理器
///
/// 所有组件共享同一个取消令牌；触发关闭只会停止分派与后台任务，
/// 已提交到调度器的作业不受影响。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 协调循环使用的令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 派生的子令牌，关闭时随父令牌一起取消
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 在后台监听 Ctrl+C 与 SIGTERM，收到后触发关闭
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown_signal() => manager.shutdown(),
                _ = manager.wait_for_shutdown() => {}
            }
        })
    }
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
