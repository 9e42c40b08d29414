use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use hawthorn::{AppConfig, Framework, TaskContext, TaskParams};
use hawthorn_core::logging::init_logging;
use tracing::info;

const DEFAULT_CONFIG: &str = "config/hawthorn.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("hawthorn")
        .version(env!("CARGO_PKG_VERSION"))
        .about("数据库协调的多节点定时任务调度")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("migrate")
                .long("migrate")
                .help("启动前在服务数据源上建表")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logger.format = format.clone();
    }

    init_logging(&config.logger, &config.cron_task)?;
    info!("启动 hawthorn 定时任务调度");
    info!("配置文件: {config_path}");

    let framework = Framework::new(config).await.context("初始化失败")?;
    if matches.get_flag("migrate") {
        framework.auto_migrate().await.context("建表失败")?;
        info!("数据表已就绪");
    }

    framework.register_task("heartbeat", heartbeat).await?;
    framework.run_until_signal().await?;

    info!("hawthorn 已退出");
    Ok(())
}

/// 内置任务：每次触发记录一条心跳日志
async fn heartbeat(ctx: TaskContext, params: TaskParams) -> Result<()> {
    info!(
        node_id = ctx.node_id(),
        trace_id = ctx.trace_id(),
        task_id = params.task_id,
        "心跳"
    );
    Ok(())
}
