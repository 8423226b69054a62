use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use orchestrator_core::{
    config::InventoryConfig,
    models::{DataAvailability, FileDescriptor},
    traits::DataReadinessGate,
    OrchestratorResult,
};

/// 产出清单中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub work_type: String,
    pub path: PathBuf,
    pub size: u64,
    pub registered_at: DateTime<Utc>,
}

/// 基于本地目录的数据清单
///
/// 每个模拟年份对应 `input_dir` 下一个按 `file_pattern` 命名的文件，
/// 就绪判断只看文件是否存在。
pub struct LocalInventory {
    input_dir: PathBuf,
    file_pattern: String,
    manifest: Option<PathBuf>,
    produced: Mutex<Vec<ManifestRecord>>,
    active_transfers: Arc<AtomicUsize>,
}

impl LocalInventory {
    pub fn new(config: &InventoryConfig) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            file_pattern: config.file_pattern.clone(),
            manifest: config.manifest.clone(),
            produced: Mutex::new(Vec::new()),
            active_transfers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// `case.h0.{year}.nc` -> `<input_dir>/case.h0.0003.nc`
    pub fn year_path(&self, year: i32) -> PathBuf {
        self.input_dir
            .join(self.file_pattern.replace("{year}", &format!("{year:04}")))
    }

    /// 本进程内登记过的所有产出
    pub async fn produced(&self) -> Vec<ManifestRecord> {
        self.produced.lock().await.clone()
    }

    /// 传输子系统用来上报进行中传输数量的计数器
    pub fn transfer_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_transfers)
    }

    async fn append_manifest(&self, records: &[ManifestRecord]) -> OrchestratorResult<()> {
        let Some(path) = &self.manifest else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl DataReadinessGate for LocalInventory {
    async fn query(&self, start_year: i32, end_year: i32) -> OrchestratorResult<DataAvailability> {
        let expected = (end_year - start_year + 1).max(0) as usize;
        let mut present = 0usize;
        for year in start_year..=end_year {
            if tokio::fs::try_exists(self.year_path(year)).await? {
                present += 1;
            }
        }

        debug!(
            "年份 {:04}-{:04} 的输入: {}/{} 个文件已就位",
            start_year, end_year, present, expected
        );

        Ok(match present {
            0 => DataAvailability::None,
            n if n == expected => DataAvailability::All,
            _ => DataAvailability::Partial,
        })
    }

    async fn register_produced_artifacts(
        &self,
        work_type: &str,
        files: Vec<FileDescriptor>,
    ) -> OrchestratorResult<()> {
        if files.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let records: Vec<ManifestRecord> = files
            .into_iter()
            .map(|file| ManifestRecord {
                work_type: work_type.to_string(),
                path: file.path,
                size: file.size,
                registered_at: now,
            })
            .collect();

        self.append_manifest(&records).await?;
        info!("{} 登记了 {} 个产出文件", work_type, records.len());
        self.produced.lock().await.extend(records);
        Ok(())
    }

    fn active_transfers(&self) -> usize {
        self.active_transfers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(dir: &Path, manifest: Option<PathBuf>) -> LocalInventory {
        LocalInventory::new(&InventoryConfig {
            input_dir: dir.to_path_buf(),
            file_pattern: "case.cam.h0.{year}.nc".to_string(),
            manifest,
        })
    }

    #[test]
    fn test_year_path_zero_pads() {
        let inventory = inventory(Path::new("/data"), None);
        assert_eq!(
            inventory.year_path(3),
            PathBuf::from("/data/case.cam.h0.0003.nc")
        );
    }

    #[tokio::test]
    async fn test_query_counts_existing_years() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = inventory(dir.path(), None);

        assert_eq!(inventory.query(1, 3).await.unwrap(), DataAvailability::None);

        std::fs::write(inventory.year_path(1), b"").unwrap();
        std::fs::write(inventory.year_path(2), b"").unwrap();
        assert_eq!(inventory.query(1, 3).await.unwrap(), DataAvailability::Partial);

        std::fs::write(inventory.year_path(3), b"").unwrap();
        assert_eq!(inventory.query(1, 3).await.unwrap(), DataAvailability::All);
        assert_eq!(inventory.query(2, 3).await.unwrap(), DataAvailability::All);
    }

    #[tokio::test]
    async fn test_register_appends_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("meta").join("produced.jsonl");
        let inventory = inventory(dir.path(), Some(manifest.clone()));

        inventory
            .register_produced_artifacts(
                "climo",
                vec![FileDescriptor {
                    path: PathBuf::from("/out/climo_0001_0005.nc"),
                    size: 2048,
                }],
            )
            .await
            .unwrap();
        inventory
            .register_produced_artifacts(
                "timeseries",
                vec![FileDescriptor {
                    path: PathBuf::from("/out/ts_0001_0005.nc"),
                    size: 10,
                }],
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(&manifest).unwrap();
        let records: Vec<ManifestRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].work_type, "climo");
        assert_eq!(records[0].size, 2048);
        assert_eq!(records[1].path, PathBuf::from("/out/ts_0001_0005.nc"));
        assert_eq!(inventory.produced().await.len(), 2);
    }

    #[test]
    fn test_active_transfers_reads_counter() {
        let inventory = inventory(Path::new("/data"), None);
        assert_eq!(inventory.active_transfers(), 0);
        inventory.transfer_counter().store(4, Ordering::Relaxed);
        assert_eq!(inventory.active_transfers(), 4);
    }
}
