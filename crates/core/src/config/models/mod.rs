pub mod app_config;
pub mod cron_task;
pub mod database;

// Re-export main types for easier imports
pub use app_config::{AppConfig, AppSection, LoggerConfig};
pub use cron_task::CronTaskConfig;
pub use database::{DatabaseConfig, DatabasesConfig, DbInstanceConfig, PASSWORD_PLACEHOLDER};
