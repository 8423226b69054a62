use tracing::{debug, error, info, warn};

use crate::models::{ExternalJobId, JobContext, JobStatus, SetStatus};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_job_submitted(ctx: &JobContext, external_id: ExternalJobId) {
        info!(
            event = "job_submitted",
            job.id = %ctx.id,
            job.name = %ctx.job_name(),
            job.work_type = ctx.work_type(),
            job.external_id = external_id,
            window.ordinal = ctx.window_ordinal,
            "作业已提交到调度器"
        );
    }
    pub fn log_job_transition(ctx: &JobContext, from: JobStatus, to: JobStatus) {
        let name = ctx.job_name();
        match to {
            JobStatus::Failed | JobStatus::Cancelled => warn!(
                event = "job_transition",
                job.id = %ctx.id,
                job.name = %name,
                job.from = %from,
                job.to = %to,
                "作业状态变更"
            ),
            _ => info!(
                event = "job_transition",
                job.id = %ctx.id,
                job.name = %name,
                job.from = %from,
                job.to = %to,
                "作业状态变更"
            ),
        }
    }
    pub fn log_submission_failure(
        ctx: &JobContext,
        failures: u32,
        watermark: u32,
        err: &dyn std::error::Error,
    ) {
        if failures > watermark {
            error!(
                event = "job_submission_failed",
                job.id = %ctx.id,
                job.name = %ctx.job_name(),
                job.submit_failures = failures,
                watermark = watermark,
                error = %err,
                "作业提交失败次数超过告警水位，将在下一轮继续重试"
            );
        } else {
            warn!(
                event = "job_submission_failed",
                job.id = %ctx.id,
                job.name = %ctx.job_name(),
                job.submit_failures = failures,
                error = %err,
                "作业提交失败，将在下一轮重试"
            );
        }
    }
    pub fn log_window_status(ordinal: usize, start_year: i32, end_year: i32, status: SetStatus) {
        match status {
            SetStatus::Failed => warn!(
                event = "window_status",
                window.ordinal = ordinal,
                window.start = start_year,
                window.end = end_year,
                window.status = %status,
                "时间窗口失败"
            ),
            _ => info!(
                event = "window_status",
                window.ordinal = ordinal,
                window.start = start_year,
                window.end = end_year,
                window.status = %status,
                "时间窗口状态变更"
            ),
        }
    }
    pub fn log_pass_summary(pass: u64, completed: usize, total: usize, in_flight: usize) {
        debug!(
            event = "pass_summary",
            pass = pass,
            jobs.completed = completed,
            jobs.total = total,
            jobs.in_flight = in_flight,
            "协调轮次结束"
        );
    }
    pub fn log_system_error(component: &str, operation: &str, err: &dyn std::error::Error) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %err,
            "系统错误"
        );
    }
}
