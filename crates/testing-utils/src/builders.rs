//! Test data builders
//!
//! 用合理的默认值快速构造配置、注册表与时间窗口。

use std::path::PathBuf;
use std::sync::Arc;

use orchestrator_core::{
    config::{
        AppConfig, InventoryConfig, LoggingConfig, RunConfig, SchedulerConfig, SimulationConfig,
        StageConfig,
    },
    models::WorkKey,
    traits::JobStrategy,
    OrchestratorResult,
};
use orchestrator_domain::{Job, StageFactory, StageRegistry, TimeWindow};

use crate::mocks::MockStrategy;

/// Builder for creating test AppConfig values
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            config: AppConfig {
                run: RunConfig {
                    poll_interval_seconds: 1,
                    ..RunConfig::default()
                },
                simulation: SimulationConfig {
                    start_year,
                    end_year,
                    case: "test_case".to_string(),
                },
                scheduler: SchedulerConfig {
                    backoff_unit_ms: 1,
                    ..SchedulerConfig::default()
                },
                inventory: InventoryConfig {
                    input_dir: PathBuf::from("input"),
                    file_pattern: "case.h0.{year}.nc".to_string(),
                    manifest: None,
                },
                logging: LoggingConfig::default(),
                stages: Vec::new(),
            },
        }
    }

    pub fn with_stage(mut self, work_type: &str, run_frequency: &[i32], depends_on: &[&str]) -> Self {
        let mut stage = StageConfig::new(work_type, run_frequency.to_vec());
        stage.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
        self.config.stages.push(stage);
        self
    }

    pub fn with_stage_config(mut self, stage: StageConfig) -> Self {
        self.config.stages.push(stage);
        self
    }

    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.config.run.run_dir = run_dir.into();
        self
    }

    pub fn with_jobs_per_node(mut self, jobs_per_node: usize) -> Self {
        self.config.run.jobs_per_node = jobs_per_node;
        self
    }

    pub fn with_dryrun(mut self, dryrun: bool) -> Self {
        self.config.run.dryrun = dryrun;
        self
    }

    pub fn with_watermark(mut self, watermark: u32) -> Self {
        self.config.run.submission_failure_watermark = watermark;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

/// 总是返回同一个策略实例的工厂
pub struct FixedStrategyFactory(pub Arc<dyn JobStrategy>);

impl StageFactory for FixedStrategyFactory {
    fn create(&self, _stage: &StageConfig) -> OrchestratorResult<Arc<dyn JobStrategy>> {
        Ok(Arc::clone(&self.0))
    }
}

/// 把若干 MockStrategy 注册到一个注册表中
pub fn registry_with(strategies: &[(&str, MockStrategy)]) -> StageRegistry {
    let mut registry = StageRegistry::new();
    for (work_type, strategy) in strategies {
        registry.register(
            *work_type,
            Arc::new(FixedStrategyFactory(Arc::new(strategy.clone()))),
        );
    }
    registry
}

/// Builder for creating test TimeWindow values
pub struct WindowBuilder {
    ordinal: usize,
    start_year: i32,
    end_year: i32,
    jobs: Vec<(WorkKey, Arc<dyn JobStrategy>)>,
}

impl WindowBuilder {
    pub fn new(ordinal: usize, start_year: i32, end_year: i32) -> Self {
        Self {
            ordinal,
            start_year,
            end_year,
            jobs: Vec::new(),
        }
    }

    pub fn with_job(mut self, work_type: &str, strategy: &MockStrategy) -> Self {
        self.jobs
            .push((WorkKey::new(work_type, None), Arc::new(strategy.clone())));
        self
    }

    pub fn with_subtype_job(mut self, work_type: &str, subtype: &str, strategy: &MockStrategy) -> Self {
        self.jobs.push((
            WorkKey::new(work_type, Some(subtype.to_string())),
            Arc::new(strategy.clone()),
        ));
        self
    }

    /// 构建窗口并建立依赖关系
    pub fn build(self) -> TimeWindow {
        let mut window = TimeWindow::new(self.ordinal, self.start_year, self.end_year)
            .expect("valid test window");
        for (key, strategy) in self.jobs {
            window
                .add_job(Job::new(
                    key,
                    self.ordinal,
                    self.start_year,
                    self.end_year,
                    strategy,
                ))
                .expect("unique test job");
        }
        window
            .setup_dependencies()
            .expect("test dependencies resolve");
        window
    }
}
