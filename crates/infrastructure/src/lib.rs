//! 外部协作方的实现：批处理调度器客户端与本地数据清单

pub mod command_runner;
pub mod inventory;
pub mod retry;
pub mod slurm;

pub use command_runner::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use inventory::{LocalInventory, ManifestRecord};
pub use retry::RetryPolicy;
pub use slurm::{map_slurm_state, SlurmClient};
