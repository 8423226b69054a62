use std::sync::Arc;

use tracing::{error, info};

use orchestrator_core::{
    config::AppConfig,
    traits::{DataReadinessGate, SchedulerClient},
    OrchestratorResult,
};
use orchestrator_dispatcher::{report_status, RunManager, RunOutcome, TaskSupervisor};
use orchestrator_domain::StageRegistry;
use orchestrator_infrastructure::{LocalInventory, SlurmClient};
use orchestrator_stages::ScriptStageFactory;

use crate::shutdown::ShutdownManager;

/// 初始化失败（配置、窗口规划、依赖）时的退出码
pub const SETUP_FAILURE_EXIT_CODE: i32 = 2;

/// 默认注册表：所有作业类型都由脚本阶段实现
pub fn default_registry(config: &AppConfig) -> StageRegistry {
    StageRegistry::new().with_fallback(Arc::new(ScriptStageFactory::from_config(config)))
}

/// 把运行结果映射为进程退出码
pub fn exit_code(result: &OrchestratorResult<RunOutcome>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => SETUP_FAILURE_EXIT_CODE,
    }
}

/// 主应用程序
pub struct Application {
    config: Arc<AppConfig>,
    registry: StageRegistry,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let registry = default_registry(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: AppConfig, registry: StageRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 使用 Slurm 与本地数据清单运行
    pub async fn run(&self, shutdown: &ShutdownManager) -> OrchestratorResult<RunOutcome> {
        let scheduler: Arc<dyn SchedulerClient> = Arc::new(SlurmClient::from_config(
            &self.config.scheduler,
            shutdown.child_token(),
        ));
        let gate: Arc<dyn DataReadinessGate> =
            Arc::new(LocalInventory::new(&self.config.inventory));
        self.run_with(scheduler, gate, shutdown).await
    }

    /// 使用给定的调度器与数据清单运行，直到全部窗口进入终态或收到关闭信号
    pub async fn run_with(
        &self,
        scheduler: Arc<dyn SchedulerClient>,
        gate: Arc<dyn DataReadinessGate>,
        shutdown: &ShutdownManager,
    ) -> OrchestratorResult<RunOutcome> {
        tokio::fs::create_dir_all(&self.config.run.run_dir).await?;

        let mut manager =
            match RunManager::setup(Arc::clone(&self.config), &self.registry, scheduler, gate)
                .await
            {
                Ok(manager) => manager,
                Err(e) => {
                    error!("编排器初始化失败: {}", e);
                    return Err(e);
                }
            };

        let mut supervisor = TaskSupervisor::new(shutdown.child_token());
        let interval = self.config.run.status_report_interval();
        if !interval.is_zero() {
            let snapshot = manager.snapshot_handle();
            supervisor.spawn("status_reporter", move |token| {
                report_status(snapshot, interval, token)
            });
        }

        let outcome = manager.run(shutdown.token()).await;

        supervisor
            .shutdown(self.config.run.shutdown_timeout())
            .await;
        info!(
            "运行结束: {:?}，已完成 {}/{} 个作业",
            outcome,
            manager.completed_jobs(),
            manager.total_jobs()
        );
        Ok(outcome)
    }
}
