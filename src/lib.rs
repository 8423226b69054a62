//! 时间窗口后处理流水线编排器

pub mod app;
pub mod shutdown;

pub use app::{default_registry, exit_code, Application, SETUP_FAILURE_EXIT_CODE};
pub use shutdown::ShutdownManager;
