use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::app_config::is_valid_level;

/// 定时任务管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronTaskConfig {
    /// 节点标识，写入租约和执行记录；为空时取应用名，再取主机名
    pub node_id: String,
    /// 调度器自身日志级别
    pub log_level: String,
    /// 任务定义对账间隔（秒）
    pub task_sync_interval_seconds: u64,
    /// 为true时不登记执行记录，租约照常抢占/释放
    pub not_record_task_execution: bool,
    /// 重试间隔（毫秒）
    pub retry_backoff_ms: u64,
    /// 租约SQL的语句/锁等待超时（毫秒）
    pub lease_statement_timeout_ms: u64,
    /// 停止时等待在途任务的最长时间（秒），0表示不等待
    pub shutdown_grace_seconds: u64,
}

impl Default for CronTaskConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            log_level: "info".to_string(),
            task_sync_interval_seconds: 15,
            not_record_task_execution: false,
            retry_backoff_ms: 1000,
            lease_statement_timeout_ms: 10_000,
            shutdown_grace_seconds: 0,
        }
    }
}

impl CronTaskConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.task_sync_interval_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_statement_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.is_empty() {
            return Err(anyhow::anyhow!("节点标识不能为空"));
        }

        if self.task_sync_interval_seconds == 0 {
            return Err(anyhow::anyhow!("任务同步间隔必须大于0"));
        }

        if self.lease_statement_timeout_ms == 0 {
            return Err(anyhow::anyhow!("租约语句超时必须大于0"));
        }

        if !is_valid_level(&self.log_level) {
            return Err(anyhow::anyhow!("无效的任务日志级别: {}", self.log_level));
        }

        Ok(())
    }
}
