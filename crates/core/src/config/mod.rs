pub mod models;

pub use models::{
    AppConfig, InventoryConfig, LoggingConfig, RunConfig, SchedulerConfig, SimulationConfig,
    StageConfig,
};
