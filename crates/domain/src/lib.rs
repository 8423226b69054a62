pub mod models;
pub mod planner;
pub mod registry;

pub use models::{Job, TimeWindow};
pub use planner::{build_windows, plan_windows, WindowPlan};
pub use registry::{StageFactory, StageRegistry};
