use serde::{Deserialize, Serialize};

/// 单个流水线阶段的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// 作业类型标签，同时是注册表中的键
    pub work_type: String,
    /// 该阶段运行的窗口长度（年）
    #[serde(default)]
    pub run_frequency: Vec<i32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// 非空时每个数据子类型各生成一个作业
    #[serde(default)]
    pub data_subtypes: Vec<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub comparison: Option<String>,
    #[serde(default = "default_walltime")]
    pub walltime: String,
    #[serde(default = "default_nodes")]
    pub nodes: u32,
}

fn default_walltime() -> String {
    "02:00:00".to_string()
}

fn default_nodes() -> u32 {
    1
}

impl StageConfig {
    pub fn new(work_type: impl Into<String>, run_frequency: Vec<i32>) -> Self {
        Self {
            work_type: work_type.into(),
            run_frequency,
            depends_on: Vec::new(),
            data_subtypes: Vec::new(),
            command: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            comparison: None,
            walltime: default_walltime(),
            nodes: default_nodes(),
        }
    }

    pub fn is_multi_instance(&self) -> bool {
        !self.data_subtypes.is_empty()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.work_type.is_empty() {
            return Err(anyhow::anyhow!("作业类型不能为空"));
        }
        if self.run_frequency.is_empty() {
            return Err(anyhow::anyhow!("阶段 {} 的运行频率不能为空", self.work_type));
        }
        if let Some(freq) = self.run_frequency.iter().find(|f| **f <= 0) {
            return Err(anyhow::anyhow!(
                "阶段 {} 的运行频率必须大于0: {}",
                self.work_type,
                freq
            ));
        }
        if self.depends_on.iter().any(|dep| dep == &self.work_type) {
            return Err(anyhow::anyhow!("阶段 {} 不能依赖自身", self.work_type));
        }
        if self.nodes == 0 {
            return Err(anyhow::anyhow!("阶段 {} 的节点数必须大于0", self.work_type));
        }
        Ok(())
    }
}
