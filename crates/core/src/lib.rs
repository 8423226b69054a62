pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{
    AppConfig, InventoryConfig, LoggingConfig, RunConfig, SchedulerConfig, SimulationConfig,
    StageConfig,
};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use logging::{init_logging, StructuredLogger};
pub use models::{
    DataAvailability, ExecutionOutcome, ExternalJobId, FileDescriptor, JobContext, JobStatus,
    QueueEntry, SetStatus, WorkKey,
};
pub use traits::{DataReadinessGate, JobStrategy, SchedulerClient};
