use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::{config::StageConfig, traits::JobStrategy, OrchestratorError, OrchestratorResult};

/// 按阶段配置构造作业策略
pub trait StageFactory: Send + Sync {
    fn create(&self, stage: &StageConfig) -> OrchestratorResult<Arc<dyn JobStrategy>>;
}

/// 作业类型到策略工厂的映射，只在构建窗口时解析一次
#[derive(Default, Clone)]
pub struct StageRegistry {
    factories: HashMap<String, Arc<dyn StageFactory>>,
    fallback: Option<Arc<dyn StageFactory>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, work_type: impl Into<String>, factory: Arc<dyn StageFactory>) {
        self.factories.insert(work_type.into(), factory);
    }

    /// 未显式注册的作业类型使用的工厂
    pub fn with_fallback(mut self, factory: Arc<dyn StageFactory>) -> Self {
        self.fallback = Some(factory);
        self
    }

    pub fn contains(&self, work_type: &str) -> bool {
        self.factories.contains_key(work_type) || self.fallback.is_some()
    }

    pub fn work_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn resolve(&self, stage: &StageConfig) -> OrchestratorResult<Arc<dyn JobStrategy>> {
        let factory = self
            .factories
            .get(&stage.work_type)
            .or(self.fallback.as_ref())
            .ok_or_else(|| OrchestratorError::UnknownWorkType(stage.work_type.clone()))?;
        factory.create(stage)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("work_types", &self.work_types())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
