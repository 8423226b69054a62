pub mod readiness;
pub mod scheduler;
pub mod strategy;

pub use readiness::DataReadinessGate;
pub use scheduler::SchedulerClient;
pub use strategy::JobStrategy;
