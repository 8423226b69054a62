pub mod job;
pub mod time_window;

pub use job::Job;
pub use time_window::TimeWindow;
