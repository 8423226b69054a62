use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use tracing::{error, info, warn};

use orchestrator_core::{config::AppConfig, init_logging};
use pipeline_orchestrator::{exit_code, Application, ShutdownManager, SETUP_FAILURE_EXIT_CODE};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // 日志可能尚未初始化，同时输出到 stderr
            eprintln!("{e:#}");
            error!("{e:#}");
            SETUP_FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let matches = Command::new("orchestrator")
        .version("1.0.0")
        .about("时间窗口后处理流水线编排器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/orchestrator.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别（覆盖配置文件）")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式（覆盖配置文件）")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("只生成脚本，不提交作业")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/orchestrator.toml");

    let mut config = AppConfig::load(Some(config_path))
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.clone();
    }
    if matches.get_flag("dry-run") {
        config.run.dryrun = true;
    }

    init_logging(&config.logging.level, &config.logging.format)?;

    info!("启动流水线编排器");
    info!("配置文件: {config_path}");
    info!(
        "模拟年份 {:04}-{:04}，{} 个阶段，运行目录 {}",
        config.simulation.start_year,
        config.simulation.end_year,
        config.stages.len(),
        config.run.run_dir.display()
    );
    if config.run.dryrun {
        warn!("dry-run 模式：作业不会提交到调度器");
    }

    let shutdown = ShutdownManager::new();
    let signals = shutdown.listen_for_signals();

    let app = Application::new(config);
    let result = app.run(&shutdown).await;

    shutdown.shutdown();
    if let Err(e) = signals.await {
        warn!("信号监听任务异常退出: {e}");
    }

    let code = exit_code(&result);
    match &result {
        Ok(outcome) => info!("流水线编排器已退出: {:?} (退出码 {})", outcome, code),
        Err(e) => error!("流水线编排器初始化失败: {} (退出码 {})", e, code),
    }
    Ok(code)
}
