//! 编排器的协调循环
//!
//! [`RunManager`] 每轮依次刷新数据就绪、分派作业、轮询在途作业并处理完成，
//! 直到所有时间窗口进入终态。

pub mod dependency_checker;
pub mod run_manager;
pub mod state_snapshot;
pub mod status_reporter;
pub mod supervisor;

pub use dependency_checker::{DependencyCheckResult, DependencyChecker};
pub use run_manager::{JobLocator, RunManager, RunOutcome, RunState};
pub use state_snapshot::{JobSnapshot, RunSnapshot, StateSnapshotWriter, WindowSnapshot};
pub use status_reporter::report_status;
pub use supervisor::TaskSupervisor;
