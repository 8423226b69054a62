//! # Orchestrator Testing Utils
//!
//! 编排器各 crate 共用的测试工具：
//!
//! - **Mock 调度器**: 内存中的 `SchedulerClient`，可编排提交失败、作业状态与丢失的作业编号
//! - **Mock 数据就绪**: 按窗口设置数据可用性，记录登记的产出文件
//! - **Mock 作业策略**: 可控制输入/输出校验结果的 `JobStrategy`
//! - **构建器**: 快速构造测试用的配置、窗口与注册表
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
