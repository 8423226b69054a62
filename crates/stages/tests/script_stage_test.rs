use std::path::Path;

use uuid::Uuid;

use orchestrator_core::{
    config::StageConfig,
    models::{ExecutionOutcome, JobContext, WorkKey},
    traits::JobStrategy,
    OrchestratorError,
};
use orchestrator_domain::StageFactory;
use orchestrator_stages::{ScriptStage, ScriptStageFactory};
use orchestrator_testing_utils::{MockReadinessGate, MockSchedulerClient};

fn context(work_type: &str, subtype: Option<&str>) -> JobContext {
    JobContext {
        id: Uuid::new_v4(),
        key: WorkKey::new(work_type, subtype.map(str::to_string)),
        start_year: 1,
        end_year: 2,
        window_ordinal: 1,
    }
}

fn climo_stage(run_dir: &Path, data_dir: &Path) -> ScriptStage {
    let mut config = StageConfig::new("climo", vec![2]);
    config.command = "ncclimo -c {case} -s {start} -e {end} -o {run_dir}/climo".to_string();
    config.inputs = vec![format!("{}/{{case}}.h0.{{year}}.nc", data_dir.display())];
    config.outputs = vec!["{run_dir}/climo/{case}_ANN_{start}_{end}.nc".to_string()];
    config.walltime = "00:30:00".to_string();
    ScriptStageFactory::new(run_dir, "piControl")
        .with_partition("debug")
        .with_account("e3sm")
        .build(&config)
}

#[test]
fn test_render_script_headers_and_marker() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let ctx = context("climo", None);

    let script = stage.render_script(&ctx);

    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("#SBATCH --job-name=climo_0001_0002"));
    assert!(script.contains("#SBATCH --nodes=1"));
    assert!(script.contains("#SBATCH --time=00:30:00"));
    assert!(script.contains("#SBATCH --partition=debug"));
    assert!(script.contains("#SBATCH --account=e3sm"));
    assert!(script.contains("ncclimo -c piControl -s 0001 -e 0002"));
    let marker = stage.marker_path(&ctx);
    assert!(script
        .trim_end()
        .ends_with(&format!("touch {}", marker.display())));
}

#[test]
fn test_setup_dependencies_requires_siblings() {
    let mut config = StageConfig::new("e3sm_diags", vec![2]);
    config.command = "e3sm_diags".to_string();
    config.depends_on = vec!["climo".to_string()];
    let stage = ScriptStageFactory::new("/run", "case").build(&config);
    let ctx = context("e3sm_diags", None);

    let err = stage
        .setup_dependencies(&ctx, &[WorkKey::new("e3sm_diags", None)])
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::DependencyNotFound { .. }));
    assert!(err.is_setup_fatal());

    let deps = stage
        .setup_dependencies(
            &ctx,
            &[WorkKey::new("climo", None), WorkKey::new("e3sm_diags", None)],
        )
        .unwrap();
    assert_eq!(deps, vec!["climo"]);
}

#[tokio::test]
async fn test_prevalidate_checks_every_year_and_links_inputs() {
    let run = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), data.path());
    let ctx = context("climo", None);

    std::fs::write(data.path().join("piControl.h0.0001.nc"), b"year1").unwrap();
    assert!(!stage.prevalidate(&ctx).await);

    std::fs::write(data.path().join("piControl.h0.0002.nc"), b"year2").unwrap();
    assert!(stage.prevalidate(&ctx).await);

    let staged = stage.staging_dir(&ctx);
    assert!(staged.join("piControl.h0.0001.nc").exists());
    assert!(staged.join("piControl.h0.0002.nc").exists());

    // 重复调用不会因为链接已存在而失败
    assert!(stage.prevalidate(&ctx).await);
}

#[tokio::test]
async fn test_execute_dryrun_writes_script_without_submitting() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let ctx = context("climo", None);
    let scheduler = MockSchedulerClient::new();

    let outcome = stage.execute(&ctx, &scheduler, true).await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::Skipped);
    assert!(stage.script_path(&ctx).exists());
    assert_eq!(scheduler.submission_count(), 0);
}

#[tokio::test]
async fn test_execute_submits_rendered_script() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let ctx = context("climo", None);
    let scheduler = MockSchedulerClient::new();

    let outcome = stage.execute(&ctx, &scheduler, false).await.unwrap();

    let ExecutionOutcome::Submitted(id) = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    assert!(id > 0);
    assert_eq!(scheduler.submitted_names(), vec!["climo_0001_0002"]);
    let script = std::fs::read_to_string(stage.script_path(&ctx)).unwrap();
    assert!(script.contains("#SBATCH --job-name=climo_0001_0002"));
}

#[tokio::test]
async fn test_execute_propagates_scheduler_rejection() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let scheduler = MockSchedulerClient::new();
    scheduler.reject_submits(true);

    let err = stage
        .execute(&context("climo", None), &scheduler, false)
        .await
        .unwrap_err();
    assert!(err.is_scheduler_failure());
}

#[tokio::test]
async fn test_postvalidate_needs_marker_and_outputs() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let ctx = context("climo", None);
    assert!(!stage.postvalidate(&ctx).await);

    let outputs = stage.output_paths(&ctx);
    assert_eq!(outputs.len(), 1);
    std::fs::create_dir_all(outputs[0].parent().unwrap()).unwrap();
    std::fs::write(&outputs[0], b"climatology").unwrap();
    assert!(!stage.postvalidate(&ctx).await);

    let marker = stage.marker_path(&ctx);
    std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
    std::fs::write(&marker, b"").unwrap();
    assert!(stage.postvalidate(&ctx).await);
}

#[tokio::test]
async fn test_handle_completion_registers_outputs() {
    let run = tempfile::tempdir().unwrap();
    let stage = climo_stage(run.path(), Path::new("/data"));
    let ctx = context("climo", None);
    let gate = MockReadinessGate::new();

    let output = stage.output_paths(&ctx).remove(0);
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"0123456789").unwrap();

    stage.handle_completion(&ctx, &gate).await.unwrap();

    let registered = gate.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, "climo");
    assert_eq!(registered[0].1[0].path, output);
    assert_eq!(registered[0].1[0].size, 10);
}

#[tokio::test]
async fn test_handle_completion_skips_missing_outputs() {
    let run = tempfile::tempdir().unwrap();
    let mut config = StageConfig::new("climo", vec![2]);
    config.command = "ncclimo".to_string();
    config.outputs = vec![
        "{run_dir}/climo/{case}_ANN_{start}_{end}.nc".to_string(),
        "{run_dir}/climo/{case}_DJF_{start}_{end}.nc".to_string(),
    ];
    let stage = ScriptStageFactory::new(run.path(), "piControl").build(&config);
    let ctx = context("climo", None);
    let gate = MockReadinessGate::new();

    stage.handle_completion(&ctx, &gate).await.unwrap();
    assert!(gate.registered().is_empty());

    let outputs = stage.output_paths(&ctx);
    std::fs::create_dir_all(outputs[0].parent().unwrap()).unwrap();
    std::fs::write(&outputs[0], b"annual").unwrap();
    stage.handle_completion(&ctx, &gate).await.unwrap();

    let registered = gate.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].1.len(), 1);
    assert_eq!(registered[0].1[0].path, outputs[0]);
}

#[test]
fn test_factory_expands_subtype_and_comparison() {
    let mut config = StageConfig::new("regrid", vec![2]);
    config.command = "regrid --component {subtype} --ref {comparison}".to_string();
    config.comparison = Some("obs".to_string());
    let factory = ScriptStageFactory::new("/run", "case");

    let strategy = factory.create(&config).unwrap();
    assert_eq!(strategy.comparison(), Some("obs"));

    let stage = factory.build(&config);
    let script = stage.render_script(&context("regrid", Some("lnd")));
    assert!(script.contains("regrid --component lnd --ref obs"));
    assert!(script.contains("#SBATCH --job-name=regrid_lnd_0001_0002"));
    assert!(!script.contains("--partition"));
}

#[test]
fn test_factory_rejects_stage_without_command() {
    let config = StageConfig::new("climo", vec![5]);
    let err = ScriptStageFactory::new("/run", "case")
        .create(&config)
        .err()
        .unwrap();
    assert!(matches!(err, OrchestratorError::Configuration(_)));
}
