//! 日志初始化
//!
//! 全局级别取 `logger.level`，调度器模块单独使用 `cron_task.log_level`；
//! 设置了 `RUST_LOG` 时以环境变量为准。

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{CronTaskConfig, LoggerConfig};

/// 调度器所在crate的日志target
pub const SCHEDULER_TARGET: &str = "hawthorn_dispatcher";

pub fn build_filter(logger: &LoggerConfig, cron_task: &CronTaskConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = format!(
        "{},{}={}",
        logger.level, SCHEDULER_TARGET, cron_task.log_level
    );
    EnvFilter::try_new(&directives).with_context(|| format!("无效的日志过滤规则: {directives}"))
}

pub fn init_logging(logger: &LoggerConfig, cron_task: &CronTaskConfig) -> Result<()> {
    let env_filter = build_filter(logger, cron_task)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match logger.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        other => {
            return Err(anyhow::anyhow!("不支持的日志格式: {other}"));
        }
    }

    Ok(())
}
