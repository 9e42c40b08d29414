use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{cron_task::CronTaskConfig, database::DatabasesConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

pub(crate) fn is_valid_level(level: &str) -> bool {
    LOG_LEVELS.contains(&level)
}

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub logger: LoggerConfig,
    pub cron_task: CronTaskConfig,
    pub databases: DatabasesConfig,
}

/// 应用标识
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 追踪号生成器的机器号
    pub worker_id: u16,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "hawthorn".to_string(),
            worker_id: 1,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    /// pretty | json
    pub format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_valid_level(&self.level) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.level));
        }
        if !LOG_FORMATS.contains(&self.format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.format));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Config file (TOML format)
    /// 2. Environment variable overrides (prefix: HAWTHORN__)
    /// 3. Complete defaults (node id, database instance merge)
    /// 4. Validate
    pub fn load(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path));
        }

        let builder = ConfigBuilder::builder()
            .add_source(File::new(config_path, FileFormat::Toml))
            .add_source(
                Environment::with_prefix("HAWTHORN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.complete_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.complete_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn complete_defaults(&mut self) {
        if self.cron_task.node_id.is_empty() {
            self.cron_task.node_id = if self.app.name.is_empty() {
                hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "hawthorn-node".to_string())
            } else {
                self.app.name.clone()
            };
        }
        self.databases.complete_defaults();
    }

    pub fn validate(&self) -> Result<()> {
        self.logger.validate().context("日志配置验证失败")?;
        self.cron_task
            .validate()
            .context("定时任务配置验证失败")?;
        self.databases.validate().context("数据源配置验证失败")?;
        Ok(())
    }
}
