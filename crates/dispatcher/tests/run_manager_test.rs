use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use orchestrator_core::models::{DataAvailability, JobStatus, SetStatus};
use orchestrator_dispatcher::{RunManager, RunOutcome, RunState};
use orchestrator_domain::TimeWindow;
use orchestrator_testing_utils::{
    registry_with, ConfigBuilder, MockReadinessGate, MockSchedulerClient, MockStrategy,
    WindowBuilder,
};

struct Harness {
    manager: RunManager,
    scheduler: MockSchedulerClient,
    gate: MockReadinessGate,
    dir: TempDir,
}

fn harness_with(windows: Vec<TimeWindow>, nodes: usize, configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = configure(ConfigBuilder::new(1, 10).with_run_dir(dir.path())).build();
    let scheduler = MockSchedulerClient::new().with_nodes(nodes);
    let gate = MockReadinessGate::new();
    let manager = RunManager::new(
        Arc::new(config),
        windows,
        Arc::new(scheduler.clone()),
        Arc::new(gate.clone()),
    );
    Harness {
        manager,
        scheduler,
        gate,
        dir,
    }
}

fn harness(windows: Vec<TimeWindow>) -> Harness {
    harness_with(windows, 1, |c| c)
}

fn status_of(manager: &RunManager, window: usize, work_type: &str) -> JobStatus {
    manager.windows()[window]
        .jobs()
        .iter()
        .find(|j| j.work_type() == work_type)
        .map(|j| j.status())
        .unwrap()
}

fn count_running_or_pending(manager: &RunManager) -> usize {
    manager
        .windows()
        .iter()
        .flat_map(|w| w.jobs())
        .filter(|j| matches!(j.status(), JobStatus::Running | JobStatus::Pending))
        .count()
}

fn climo_and_diags(ordinal: usize, start: i32, end: i32) -> (TimeWindow, MockStrategy, MockStrategy) {
    let climo = MockStrategy::new();
    let diags = MockStrategy::new().with_dependencies(&["climo"]);
    let window = WindowBuilder::new(ordinal, start, end)
        .with_job("climo", &climo)
        .with_job("e3sm_diags", &diags)
        .build();
    (window, climo, diags)
}

#[tokio::test]
async fn test_dependent_job_waits_for_dependency_completion() {
    let (window, _climo, _diags) = climo_and_diags(1, 1, 5);
    let mut h = harness(vec![window]);

    h.manager.run_pass().await;
    assert_eq!(h.scheduler.submitted_names(), vec!["climo_0001_0005"]);
    assert_eq!(status_of(&h.manager, 0, "e3sm_diags"), JobStatus::Valid);

    h.scheduler.set_status_where("climo_", JobStatus::Running);
    h.manager.run_pass().await;
    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Running);
    assert_eq!(h.manager.windows()[0].status(), SetStatus::Running);
    assert_eq!(h.scheduler.submission_count(), 1);

    h.scheduler.set_status_where("climo_", JobStatus::Completed);
    h.manager.run_pass().await;
    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Completed);
    // 依赖在本轮轮询阶段才完成，下一轮才会分派
    assert_eq!(h.scheduler.submission_count(), 1);

    h.manager.run_pass().await;
    assert_eq!(
        h.scheduler.submitted_names(),
        vec!["climo_0001_0005", "e3sm_diags_0001_0005"]
    );
}

#[tokio::test]
async fn test_concurrency_bound_holds_every_pass() {
    let strategy = MockStrategy::new();
    let windows = (0..4)
        .map(|i| {
            WindowBuilder::new(i + 1, 1 + 5 * i as i32, 5 + 5 * i as i32)
                .with_job("climo", &strategy)
                .build()
        })
        .collect();
    let mut h = harness_with(windows, 1, |c| c.with_jobs_per_node(2));

    let mut passes = 0;
    loop {
        let state = h.manager.run_pass().await;
        passes += 1;
        assert_eq!(h.manager.max_running_jobs(), 2);
        assert!(count_running_or_pending(&h.manager) <= 2);
        assert!(h.manager.active_job_count() <= 2);
        if state.is_terminal() {
            assert_eq!(state, RunState::Succeeded);
            break;
        }
        assert!(passes < 20, "run did not converge");
        h.scheduler.set_all_statuses(JobStatus::Running);
        h.manager.run_pass().await;
        assert!(count_running_or_pending(&h.manager) <= 2);
        h.scheduler.set_all_statuses(JobStatus::Completed);
    }
    assert_eq!(h.scheduler.submission_count(), 4);
}

#[tokio::test]
async fn test_dispatch_is_idempotent_without_external_change() {
    let (window, _climo, _diags) = climo_and_diags(1, 1, 5);
    let mut h = harness(vec![window]);

    h.manager.refresh_readiness().await;
    h.manager.refresh_capacity().await;
    assert_eq!(h.manager.dispatch_ready_jobs().await, 1);
    let before = h.manager.snapshot().windows;

    assert_eq!(h.manager.dispatch_ready_jobs().await, 0);
    assert_eq!(h.scheduler.submission_count(), 1);
    assert_eq!(h.manager.snapshot().windows, before);
}

#[tokio::test]
async fn test_output_validation_overrides_scheduler_success() {
    let climo = MockStrategy::new();
    climo.break_outputs("climo_0001_0005");
    let window = WindowBuilder::new(1, 1, 5).with_job("climo", &climo).build();
    let mut h = harness(vec![window]);

    h.manager.run_pass().await;
    h.scheduler.set_all_statuses(JobStatus::Completed);
    let state = h.manager.run_pass().await;

    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Failed);
    assert_eq!(h.manager.windows()[0].status(), SetStatus::Failed);
    assert_eq!(state, RunState::Failed);
    assert!(h.gate.registered().is_empty());
}

#[tokio::test]
async fn test_window_aggregates_job_outcomes() {
    let strategy = MockStrategy::new();
    let windows = vec![
        WindowBuilder::new(1, 1, 5)
            .with_job("a", &strategy)
            .with_job("b", &strategy)
            .build(),
        WindowBuilder::new(2, 6, 10)
            .with_job("a", &strategy)
            .with_job("b", &strategy)
            .build(),
    ];
    let mut h = harness_with(windows, 2, |c| c);

    h.manager.run_pass().await;
    assert_eq!(h.scheduler.submission_count(), 4);
    h.scheduler.set_all_statuses(JobStatus::Completed);
    h.scheduler.set_status_where("b_0006_0010", JobStatus::Failed);
    let state = h.manager.run_pass().await;

    assert_eq!(h.manager.windows()[0].status(), SetStatus::Completed);
    assert_eq!(h.manager.windows()[1].status(), SetStatus::Failed);
    assert_eq!(state, RunState::Failed);
    assert_eq!(h.manager.completed_jobs(), 4);
    assert_eq!(h.gate.registered().len(), 3);
}

#[tokio::test]
async fn test_transient_submission_failure_retried_next_pass() {
    let strategy = MockStrategy::new();
    let window = WindowBuilder::new(1, 1, 5).with_job("climo", &strategy).build();
    let mut h = harness(vec![window]);
    h.scheduler.fail_next_submits(1);

    h.manager.run_pass().await;
    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Valid);
    assert_eq!(h.scheduler.submission_count(), 0);

    h.manager.run_pass().await;
    let job = &h.manager.windows()[0].jobs()[0];
    assert_eq!(job.status(), JobStatus::Submitted);
    assert_eq!(job.submit_failures(), 1);
    assert_eq!(h.scheduler.submit_attempts(), 2);
}

#[tokio::test]
async fn test_persistent_submission_failures_flagged_in_state_file() {
    let strategy = MockStrategy::new();
    let window = WindowBuilder::new(1, 1, 5).with_job("climo", &strategy).build();
    let mut h = harness_with(vec![window], 1, |c| c.with_watermark(2));
    h.scheduler.reject_submits(true);

    for _ in 0..4 {
        assert_eq!(h.manager.run_pass().await, RunState::Running);
    }

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.over_watermark().len(), 1);
    let text = std::fs::read_to_string(h.dir.path().join("state.txt")).unwrap();
    assert!(text.contains("climo: --  VALID  [submission failures: 4]"));
}

#[tokio::test]
async fn test_empty_window_is_vacuously_complete() {
    let window = TimeWindow::new(1, 1, 5).unwrap();
    let h = harness(vec![window]);

    assert_eq!(h.manager.windows()[0].status(), SetStatus::Completed);
    assert_eq!(h.manager.is_all_done(), RunState::Succeeded);
}

#[tokio::test]
async fn test_two_window_dependency_scenario() {
    let a = MockStrategy::new();
    let b = MockStrategy::new().with_dependencies(&["A"]);
    let windows = vec![
        WindowBuilder::new(1, 1, 5).with_job("A", &a).with_job("B", &b).build(),
        WindowBuilder::new(2, 6, 10).with_job("A", &a).with_job("B", &b).build(),
    ];
    let mut h = harness(windows);
    h.gate.set_availability(1, 5, DataAvailability::All);
    h.gate.set_availability(6, 10, DataAvailability::All);

    assert_eq!(h.manager.run_pass().await, RunState::Running);
    assert_eq!(h.scheduler.submitted_names(), vec!["A_0001_0005", "A_0006_0010"]);
    assert_eq!(status_of(&h.manager, 0, "B"), JobStatus::Valid);
    assert_eq!(status_of(&h.manager, 1, "B"), JobStatus::Valid);

    h.scheduler.set_status_where("A_", JobStatus::Completed);
    h.manager.run_pass().await;
    assert_eq!(h.scheduler.submission_count(), 2);

    h.manager.run_pass().await;
    assert_eq!(
        h.scheduler.submitted_names(),
        vec!["A_0001_0005", "A_0006_0010", "B_0001_0005", "B_0006_0010"]
    );

    h.scheduler.set_status_where("B_", JobStatus::Completed);
    let state = h.manager.run_pass().await;

    assert_eq!(state, RunState::Succeeded);
    assert!(h
        .manager
        .windows()
        .iter()
        .all(|w| w.status() == SetStatus::Completed));
}

#[tokio::test]
async fn test_lost_job_falls_back_to_output_validation() {
    let climo = MockStrategy::new();
    let diags = MockStrategy::new();
    diags.break_outputs("e3sm_diags_0001_0005");
    let window = WindowBuilder::new(1, 1, 5)
        .with_job("climo", &climo)
        .with_job("e3sm_diags", &diags)
        .build();
    let mut h = harness(vec![window]);

    h.manager.run_pass().await;
    for (id, _) in h.scheduler.submissions() {
        h.scheduler.lose_job(id);
    }
    h.manager.run_pass().await;

    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Completed);
    assert_eq!(status_of(&h.manager, 0, "e3sm_diags"), JobStatus::Submitted);
    assert_eq!(h.manager.in_flight().len(), 1);
}

#[tokio::test]
async fn test_missing_inputs_park_job_until_available() {
    let climo = MockStrategy::new();
    climo.set_inputs_missing("climo_0001_0005", true);
    let window = WindowBuilder::new(1, 1, 5).with_job("climo", &climo).build();
    let mut h = harness(vec![window]);

    h.manager.run_pass().await;
    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::WaitingOnInput);
    assert_eq!(h.scheduler.submission_count(), 0);

    climo.set_inputs_missing("climo_0001_0005", false);
    h.manager.run_pass().await;
    assert_eq!(status_of(&h.manager, 0, "climo"), JobStatus::Submitted);
}

#[tokio::test]
async fn test_window_without_data_is_not_dispatched() {
    let strategy = MockStrategy::new();
    let windows = vec![
        WindowBuilder::new(1, 1, 5).with_job("climo", &strategy).build(),
        WindowBuilder::new(2, 6, 10).with_job("climo", &strategy).build(),
    ];
    let mut h = harness(windows);
    h.gate.set_availability(6, 10, DataAvailability::Partial);

    h.manager.run_pass().await;

    assert_eq!(h.scheduler.submitted_names(), vec!["climo_0001_0005"]);
    assert_eq!(h.manager.windows()[1].status(), SetStatus::PartialData);
}

#[tokio::test]
async fn test_capacity_requeried_while_scheduler_reports_no_nodes() {
    let strategy = MockStrategy::new();
    let window = WindowBuilder::new(1, 1, 5).with_job("climo", &strategy).build();
    let mut h = harness_with(vec![window], 0, |c| c);

    h.manager.run_pass().await;
    assert_eq!(h.manager.max_running_jobs(), 0);
    assert_eq!(h.scheduler.submission_count(), 0);

    h.scheduler.set_nodes(2);
    h.manager.run_pass().await;
    assert_eq!(h.manager.max_running_jobs(), 6);
    assert_eq!(h.scheduler.submission_count(), 1);
}

#[tokio::test]
async fn test_dryrun_completes_without_scheduler() {
    let (window, climo, _diags) = climo_and_diags(1, 1, 5);
    let mut h = harness_with(vec![window], 1, |c| c.with_dryrun(true));

    let outcome = h.manager.run(CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(h.scheduler.submission_count(), 0);
    assert_eq!(climo.executions(), vec!["climo_0001_0005"]);
    assert!(climo.completions().is_empty());
    assert!(h.gate.registered().is_empty());
    let text = std::fs::read_to_string(h.dir.path().join("state.txt")).unwrap();
    assert!(text.contains("status: COMPLETED"));
}

#[tokio::test]
async fn test_dryrun_ignores_scheduler_capacity() {
    let strategy = MockStrategy::new();
    let windows = (0..3)
        .map(|i| {
            WindowBuilder::new(i + 1, 1 + 5 * i as i32, 5 + 5 * i as i32)
                .with_job("climo", &strategy)
                .build()
        })
        .collect();
    let mut h = harness_with(windows, 0, |c| c.with_dryrun(true));

    let state = h.manager.run_pass().await;

    assert_eq!(state, RunState::Succeeded);
    assert_eq!(h.manager.completed_jobs(), 3);
    assert_eq!(h.manager.max_running_jobs(), 0);
    assert_eq!(h.scheduler.node_query_count(), 0);
    assert_eq!(h.scheduler.submission_count(), 0);
}

#[tokio::test]
async fn test_restart_adopts_queued_jobs_instead_of_resubmitting() {
    let (window, _climo, _diags) = climo_and_diags(1, 1, 5);
    let mut first = harness(vec![window]);
    first.manager.run_pass().await;
    let (external_id, _) = first.scheduler.submissions()[0].clone();
    first.scheduler.set_status_where("climo_", JobStatus::Running);

    let climo = MockStrategy::new();
    let diags = MockStrategy::new().with_dependencies(&["climo"]);
    let window = WindowBuilder::new(1, 1, 5)
        .with_job("climo", &climo)
        .with_job("e3sm_diags", &diags)
        .build();
    let config = ConfigBuilder::new(1, 10)
        .with_run_dir(first.dir.path())
        .build();
    let mut restarted = RunManager::new(
        Arc::new(config),
        vec![window],
        Arc::new(first.scheduler.clone()),
        Arc::new(MockReadinessGate::new()),
    );

    restarted.run_pass().await;
    let job = &restarted.windows()[0].jobs()[0];
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.external_id(), Some(external_id));
    assert!(job.has_been_submitted());
    assert_eq!(restarted.windows()[0].status(), SetStatus::Running);
    assert_eq!(restarted.in_flight().len(), 1);
    assert_eq!(first.scheduler.submission_count(), 1);

    climo.mark_outputs_present("climo_0001_0005");
    first.scheduler.set_status_where("climo_", JobStatus::Completed);
    restarted.run_pass().await;
    assert_eq!(status_of(&restarted, 0, "climo"), JobStatus::Completed);

    restarted.run_pass().await;
    assert_eq!(
        first.scheduler.submitted_names(),
        vec!["climo_0001_0005", "e3sm_diags_0001_0005"]
    );
}

#[tokio::test]
async fn test_shutdown_interrupts_without_cancelling_jobs() {
    let (window, _climo, _diags) = climo_and_diags(1, 1, 5);
    let mut h = harness(vec![window]);
    h.manager.run_pass().await;

    let token = CancellationToken::new();
    token.cancel();
    let outcome = h.manager.run(token).await;

    assert_eq!(outcome, RunOutcome::Interrupted);
    assert_eq!(outcome.exit_code(), 3);
    assert!(h.scheduler.cancelled().is_empty());
    assert!(h.dir.path().join("state.txt").exists());
}

#[tokio::test]
async fn test_cancel_in_flight_is_explicit() {
    let strategy = MockStrategy::new();
    let windows = vec![
        WindowBuilder::new(1, 1, 5).with_job("climo", &strategy).build(),
        WindowBuilder::new(2, 6, 10).with_job("climo", &strategy).build(),
    ];
    let mut h = harness(windows);
    h.manager.run_pass().await;

    assert_eq!(h.manager.cancel_in_flight().await, 2);
    assert_eq!(h.scheduler.cancelled().len(), 2);

    h.manager.run_pass().await;
    assert_eq!(h.manager.is_all_done(), RunState::Failed);
}

#[tokio::test]
async fn test_published_snapshot_tracks_passes() {
    let (window, _climo, _diags) = climo_and_diags(1, 1, 5);
    let mut h = harness(vec![window]);
    let handle = h.manager.snapshot_handle();

    h.manager.run_pass().await;
    h.manager.run_pass().await;

    let snapshot = handle.read().await;
    assert_eq!(snapshot.pass, 2);
    assert_eq!(snapshot.total_jobs, 2);
    assert_eq!(snapshot.in_flight, 1);
    assert_eq!(snapshot.windows[0].jobs[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn test_setup_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(1, 10)
        .with_run_dir(dir.path())
        .with_stage("climo", &[5, 10], &[])
        .with_stage("e3sm_diags", &[5], &["climo"])
        .build();
    let registry = registry_with(&[
        ("climo", MockStrategy::new()),
        ("e3sm_diags", MockStrategy::new().with_dependencies(&["climo"])),
    ]);
    let scheduler = MockSchedulerClient::new().with_nodes(4);

    let manager = RunManager::setup(
        Arc::new(config),
        &registry,
        Arc::new(scheduler),
        Arc::new(MockReadinessGate::new()),
    )
    .await
    .unwrap();

    assert_eq!(manager.windows().len(), 3);
    assert_eq!(manager.total_jobs(), 5);
    assert_eq!(manager.max_running_jobs(), 12);
}

#[tokio::test]
async fn test_setup_rejects_cyclic_stage_dependencies() {
    let config = ConfigBuilder::new(1, 10)
        .with_stage("a", &[5], &["b"])
        .with_stage("b", &[5], &["a"])
        .build();
    let registry = registry_with(&[
        ("a", MockStrategy::new().with_dependencies(&["b"])),
        ("b", MockStrategy::new().with_dependencies(&["a"])),
    ]);

    let result = RunManager::setup(
        Arc::new(config),
        &registry,
        Arc::new(MockSchedulerClient::new()),
        Arc::new(MockReadinessGate::new()),
    )
    .await;

    assert!(result.err().unwrap().is_setup_fatal());
}
