use serde::{Deserialize, Serialize};

/// 模拟输出的年份范围（闭区间）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default)]
    pub case: String,
}

impl SimulationConfig {
    pub fn length(&self) -> i32 {
        self.end_year - self.start_year + 1
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.end_year < self.start_year {
            return Err(anyhow::anyhow!(
                "结束年份 {} 早于起始年份 {}",
                self.end_year,
                self.start_year
            ));
        }
        Ok(())
    }
}
