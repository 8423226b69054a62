use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use orchestrator_core::{
    models::{ExternalJobId, JobStatus, SetStatus},
    OrchestratorResult,
};
use orchestrator_domain::{Job, TimeWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub name: String,
    pub work_type: String,
    pub data_subtype: Option<String>,
    pub external_id: Option<ExternalJobId>,
    pub status: JobStatus,
    pub submit_failures: u32,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            name: job.name(),
            work_type: job.work_type().to_string(),
            data_subtype: job.data_subtype().map(str::to_string),
            external_id: job.external_id(),
            status: job.status(),
            submit_failures: job.submit_failures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub ordinal: usize,
    pub start_year: i32,
    pub end_year: i32,
    pub status: SetStatus,
    pub jobs: Vec<JobSnapshot>,
}

impl From<&TimeWindow> for WindowSnapshot {
    fn from(window: &TimeWindow) -> Self {
        Self {
            ordinal: window.ordinal(),
            start_year: window.start_year(),
            end_year: window.end_year(),
            status: window.status(),
            jobs: window.jobs().iter().map(JobSnapshot::from).collect(),
        }
    }
}

/// 每轮协调结束后发布的只读快照
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub pass: u64,
    pub generated_at: DateTime<Utc>,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub in_flight: usize,
    pub max_running_jobs: usize,
    pub submission_failure_watermark: u32,
    pub windows: Vec<WindowSnapshot>,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            pass: 0,
            generated_at: Utc::now(),
            total_jobs: 0,
            completed_jobs: 0,
            in_flight: 0,
            max_running_jobs: 0,
            submission_failure_watermark: 0,
            windows: Vec::new(),
        }
    }
}

impl RunSnapshot {
    pub fn windows_with_status(&self, status: SetStatus) -> usize {
        self.windows.iter().filter(|w| w.status == status).count()
    }

    /// 超过提交失败告警水位的作业
    pub fn over_watermark(&self) -> Vec<&JobSnapshot> {
        self.windows
            .iter()
            .flat_map(|w| w.jobs.iter())
            .filter(|j| j.submit_failures > self.submission_failure_watermark)
            .collect()
    }

    /// 渲染为给运维人员看的纯文本
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "pass {} at {}  jobs completed {}/{}  in flight {}/{}",
            self.pass,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.completed_jobs,
            self.total_jobs,
            self.in_flight,
            self.max_running_jobs
        );
        out.push_str(&"=".repeat(72));
        out.push('\n');

        for window in &self.windows {
            let _ = writeln!(
                out,
                "Year set {}: {:04} - {:04}  status: {}",
                window.ordinal, window.start_year, window.end_year, window.status
            );
            if window.jobs.is_empty() {
                out.push_str("    (no jobs)\n");
            }
            for job in &window.jobs {
                let label = match &job.data_subtype {
                    Some(subtype) => format!("{} ({})", job.work_type, subtype),
                    None => job.work_type.clone(),
                };
                let id = job
                    .external_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "--".to_string());
                let _ = write!(out, "    {label}: {id}  {}", job.status);
                if job.submit_failures > self.submission_failure_watermark {
                    let _ = write!(out, "  [submission failures: {}]", job.submit_failures);
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// 状态文件写入器，每轮整体覆盖
#[derive(Debug, Clone)]
pub struct StateSnapshotWriter {
    path: PathBuf,
}

impl StateSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 先写临时文件再重命名，读者不会看到写了一半的文件
    pub async fn write(&self, snapshot: &RunSnapshot) -> OrchestratorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, snapshot.render()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("状态快照已写入 {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunSnapshot {
        RunSnapshot {
            pass: 3,
            total_jobs: 2,
            completed_jobs: 1,
            in_flight: 1,
            max_running_jobs: 6,
            submission_failure_watermark: 5,
            windows: vec![
                WindowSnapshot {
                    ordinal: 1,
                    start_year: 1,
                    end_year: 5,
                    status: SetStatus::Running,
                    jobs: vec![
                        JobSnapshot {
                            name: "climo_0001_0005".to_string(),
                            work_type: "climo".to_string(),
                            data_subtype: None,
                            external_id: Some(1001),
                            status: JobStatus::Completed,
                            submit_failures: 0,
                        },
                        JobSnapshot {
                            name: "regrid_atm_0001_0005".to_string(),
                            work_type: "regrid".to_string(),
                            data_subtype: Some("atm".to_string()),
                            external_id: None,
                            status: JobStatus::Valid,
                            submit_failures: 7,
                        },
                    ],
                },
                WindowSnapshot {
                    ordinal: 2,
                    start_year: 1,
                    end_year: 10,
                    status: SetStatus::Completed,
                    jobs: Vec::new(),
                },
            ],
            ..RunSnapshot::default()
        }
    }

    #[test]
    fn test_render_lists_windows_and_jobs() {
        let text = sample().render();
        assert!(text.contains("Year set 1: 0001 - 0005  status: RUNNING"));
        assert!(text.contains("    climo: 1001  COMPLETED"));
        assert!(text.contains("    regrid (atm): --  VALID  [submission failures: 7]"));
        assert!(text.contains("Year set 2: 0001 - 0010  status: COMPLETED"));
        assert!(text.contains("(no jobs)"));
    }

    #[test]
    fn test_over_watermark() {
        let snapshot = sample();
        let flagged = snapshot.over_watermark();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].name, "regrid_atm_0001_0005");
        assert_eq!(snapshot.windows_with_status(SetStatus::Completed), 1);
    }

    #[tokio::test]
    async fn test_write_overwrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StateSnapshotWriter::new(dir.path().join("nested").join("state.txt"));

        writer.write(&sample()).await.unwrap();
        let mut second = sample();
        second.pass = 4;
        writer.write(&second).await.unwrap();

        let text = std::fs::read_to_string(writer.path()).unwrap();
        assert!(text.starts_with("pass 4 at"));
        assert!(!dir.path().join("nested").join("state.tmp").exists());
    }
}
