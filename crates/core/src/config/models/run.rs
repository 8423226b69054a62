use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 编排循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 运行目录，脚本、输入链接与状态文件都放在这里
    pub run_dir: PathBuf,
    /// 状态快照文件名（相对 run_dir）
    pub state_file: String,
    /// 两轮协调之间的间隔（秒）
    pub poll_interval_seconds: u64,
    /// dry-run 模式：不提交作业，直接视为完成
    pub dryrun: bool,
    /// 每个节点允许的并发作业数
    pub jobs_per_node: usize,
    /// 单个作业提交失败次数的告警水位
    pub submission_failure_watermark: u32,
    /// 关闭时等待后台任务的超时（秒）
    pub shutdown_timeout_seconds: u64,
    /// 状态汇报间隔（秒）
    pub status_report_interval_seconds: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("run"),
            state_file: "state.txt".to_string(),
            poll_interval_seconds: 10,
            dryrun: false,
            jobs_per_node: 3,
            submission_failure_watermark: 5,
            shutdown_timeout_seconds: 30,
            status_report_interval_seconds: 60,
        }
    }
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
    pub fn status_report_interval(&self) -> Duration {
        Duration::from_secs(self.status_report_interval_seconds)
    }
    pub fn state_path(&self) -> PathBuf {
        self.run_dir.join(&self.state_file)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }
        if self.jobs_per_node == 0 {
            return Err(anyhow::anyhow!("每节点并发作业数必须大于0"));
        }
        if self.state_file.is_empty() {
            return Err(anyhow::anyhow!("状态文件名不能为空"));
        }
        Ok(())
    }
}
