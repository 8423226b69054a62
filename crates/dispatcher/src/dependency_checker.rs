use std::collections::{HashMap, VecDeque};

use orchestrator_core::{config::StageConfig, OrchestratorError, OrchestratorResult};
use orchestrator_domain::{Job, TimeWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheckResult {
    pub can_execute: bool,
    pub blocking_dependencies: Vec<String>,
}

/// 同窗口兄弟作业之间的依赖判断
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyChecker;

impl DependencyChecker {
    pub fn new() -> Self {
        Self
    }

    /// 依赖的每个作业类型在同一窗口内都已 COMPLETED 时作业才可执行
    pub fn check(&self, window: &TimeWindow, job: &Job) -> DependencyCheckResult {
        let blocking_dependencies: Vec<String> = job
            .depends_on()
            .iter()
            .filter(|work_type| !window.dependency_satisfied(work_type))
            .cloned()
            .collect();

        DependencyCheckResult {
            can_execute: blocking_dependencies.is_empty(),
            blocking_dependencies,
        }
    }

    /// 阶段依赖图中存在环时，相关作业会永远等待，初始化时直接拒绝
    pub fn validate_stage_graph(&self, stages: &[StageConfig]) -> OrchestratorResult<()> {
        let graph: HashMap<&str, Vec<&str>> = stages
            .iter()
            .map(|stage| {
                (
                    stage.work_type.as_str(),
                    stage.depends_on.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        if let Some(cycle) = Self::find_cycle_members(&graph) {
            return Err(OrchestratorError::config_error(format!(
                "阶段依赖存在循环: {}",
                cycle.join(", ")
            )));
        }
        Ok(())
    }

    /// Kahn 拓扑排序，返回无法排序（处于环上或依赖环）的节点
    fn find_cycle_members(graph: &HashMap<&str, Vec<&str>>) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = graph.keys().map(|node| (*node, 0)).collect();
        for dependencies in graph.values() {
            for dep in dependencies {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop_front() {
            processed += 1;
            for dep in graph.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dep);
                    }
                }
            }
        }

        if processed == graph.len() {
            return None;
        }
        let mut members: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(node, _)| node.to_string())
            .collect();
        members.sort();
        Some(members)
    }
}
