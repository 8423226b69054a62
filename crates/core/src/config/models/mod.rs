pub mod app_config;
pub mod inventory;
pub mod logging;
pub mod run;
pub mod scheduler;
pub mod simulation;
pub mod stage;

pub use app_config::AppConfig;
pub use inventory::InventoryConfig;
pub use logging::LoggingConfig;
pub use run::RunConfig;
pub use scheduler::SchedulerConfig;
pub use simulation::SimulationConfig;
pub use stage::StageConfig;
