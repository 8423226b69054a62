use std::sync::Arc;

use tracing::{debug, info};

use orchestrator_core::{
    config::AppConfig,
    models::{SetStatus, WorkKey},
    traits::JobStrategy,
    OrchestratorError, OrchestratorResult,
};

use crate::{models::Job, models::TimeWindow, registry::StageRegistry};

/// 计划中的窗口：(序号, 开始年份, 结束年份)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub ordinal: usize,
    pub start_year: i32,
    pub end_year: i32,
}

impl WindowPlan {
    pub fn length(&self) -> i32 {
        self.end_year - self.start_year + 1
    }
}

/// 按每个窗口长度把模拟区间切成连续不重叠的窗口，不足一个长度的尾部不生成窗口
pub fn plan_windows(
    start_year: i32,
    end_year: i32,
    frequencies: &[i32],
) -> OrchestratorResult<Vec<WindowPlan>> {
    if end_year < start_year {
        return Err(OrchestratorError::InvalidWindowConfig(format!(
            "模拟结束年份 {end_year} 早于开始年份 {start_year}"
        )));
    }
    let length = end_year - start_year + 1;

    let mut seen = std::collections::BTreeSet::new();
    let mut plans = Vec::new();
    for &freq in frequencies {
        if freq <= 0 {
            return Err(OrchestratorError::InvalidWindowConfig(format!(
                "窗口长度必须为正数: {freq}"
            )));
        }
        if !seen.insert(freq) {
            continue;
        }
        for k in 0..(length / freq) {
            let window_start = start_year + k * freq;
            plans.push(WindowPlan {
                ordinal: plans.len() + 1,
                start_year: window_start,
                end_year: window_start + freq - 1,
            });
        }
    }
    Ok(plans)
}

/// 根据配置构建全部时间窗口及作业，并建立依赖关系
pub fn build_windows(
    config: &AppConfig,
    registry: &StageRegistry,
) -> OrchestratorResult<Vec<TimeWindow>> {
    let strategies = config
        .stages
        .iter()
        .map(|stage| Ok((stage, registry.resolve(stage)?)))
        .collect::<OrchestratorResult<Vec<(_, Arc<dyn JobStrategy>)>>>()?;

    let plans = plan_windows(
        config.simulation.start_year,
        config.simulation.end_year,
        &config.frequencies(),
    )?;

    let mut windows = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut window = TimeWindow::new(plan.ordinal, plan.start_year, plan.end_year)?;

        for (stage, strategy) in &strategies {
            if !stage.run_frequency.contains(&plan.length()) {
                continue;
            }
            let subtypes: Vec<Option<String>> = if stage.is_multi_instance() {
                stage.data_subtypes.iter().cloned().map(Some).collect()
            } else {
                vec![None]
            };
            for subtype in subtypes {
                let key = WorkKey::new(stage.work_type.clone(), subtype);
                let job = Job::new(
                    key,
                    plan.ordinal,
                    plan.start_year,
                    plan.end_year,
                    Arc::clone(strategy),
                );
                window.add_job(job)?;
            }
        }

        window.setup_dependencies()?;
        if window.is_empty() {
            window.set_status(SetStatus::Completed);
        }
        debug!("窗口 {} 包含 {} 个作业", window.label(), window.jobs().len());
        windows.push(window);
    }

    info!(
        "已构建 {} 个时间窗口，共 {} 个作业",
        windows.len(),
        windows.iter().map(|w| w.jobs().len()).sum::<usize>()
    );
    Ok(windows)
}
