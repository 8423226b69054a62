use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    inventory::InventoryConfig, logging::LoggingConfig, run::RunConfig,
    scheduler::SchedulerConfig, simulation::SimulationConfig, stage::StageConfig,
};

/// 编排器完整配置，构建后不可变，按引用传入各组件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunConfig,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Config file (TOML format)
    /// 2. Environment variable overrides (prefix: ORCHESTRATOR_, separator: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/orchestrator.toml", "orchestrator.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!(
                    "未找到配置文件，已尝试: {:?}",
                    default_paths
                ));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()
            .context("解析TOML配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 所有阶段用到的窗口长度，升序去重
    pub fn frequencies(&self) -> Vec<i32> {
        self.stages
            .iter()
            .flat_map(|stage| stage.run_frequency.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stage(&self, work_type: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.work_type == work_type)
    }

    pub fn validate(&self) -> Result<()> {
        self.run.validate().context("运行配置验证失败")?;
        self.simulation.validate().context("模拟年份配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.inventory.validate().context("数据清单配置验证失败")?;
        self.logging.validate().context("日志配置验证失败")?;

        if self.stages.is_empty() {
            return Err(anyhow::anyhow!("至少需要配置一个流水线阶段"));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage
                .validate()
                .with_context(|| format!("阶段 {} 配置验证失败", stage.work_type))?;
            if !seen.insert(stage.work_type.as_str()) {
                return Err(anyhow::anyhow!("重复的阶段类型: {}", stage.work_type));
            }
        }

        let length = self.simulation.length();
        if let Some(freq) = self.frequencies().into_iter().find(|f| *f > length) {
            return Err(anyhow::anyhow!(
                "运行频率 {} 年超过模拟长度 {} 年",
                freq,
                length
            ));
        }

        Ok(())
    }
}
