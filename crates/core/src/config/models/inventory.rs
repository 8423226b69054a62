use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 本地数据清单配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub input_dir: PathBuf,
    /// 每年一个文件的命名模式，必须包含 `{year}`
    pub file_pattern: String,
    /// 产出登记清单（JSON lines），可选
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

impl InventoryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.file_pattern.contains("{year}") {
            return Err(anyhow::anyhow!(
                "文件模式必须包含 {{year}} 占位符: {}",
                self.file_pattern
            ));
        }
        Ok(())
    }
}
