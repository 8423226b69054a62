use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orchestrator_core::models::SetStatus;

use crate::state_snapshot::RunSnapshot;

/// 周期性读取快照并输出一行进度汇总，只读不写
pub async fn report_status(
    snapshot: Arc<RwLock<RunSnapshot>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = snapshot.read().await;
                log_summary(&snapshot);
            }
        }
    }
}

fn log_summary(snapshot: &RunSnapshot) {
    info!(
        pass = snapshot.pass,
        jobs.completed = snapshot.completed_jobs,
        jobs.total = snapshot.total_jobs,
        jobs.in_flight = snapshot.in_flight,
        windows.completed = snapshot.windows_with_status(SetStatus::Completed),
        windows.failed = snapshot.windows_with_status(SetStatus::Failed),
        windows.total = snapshot.windows.len(),
        "运行进度"
    );
    for job in snapshot.over_watermark() {
        warn!(
            job.name = %job.name,
            job.submit_failures = job.submit_failures,
            "作业提交持续失败"
        );
    }
}
