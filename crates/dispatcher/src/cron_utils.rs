use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use hawthorn_core::{SchedulerError, SchedulerResult};

/// 秒级CRON表达式（6或7段）
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: Schedule,
}

impl CronSchedule {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取 `from` 之后的下一次触发时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}
