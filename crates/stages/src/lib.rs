//! 基于脚本模板的通用流水线阶段

pub mod script_stage;
pub mod template;

pub use script_stage::{ScriptStage, ScriptStageFactory};
pub use template::TemplateVars;
