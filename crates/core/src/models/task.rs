use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 任务定义
///
/// 对应 `hawthorn_task` 表。调度相关字段为 `cron_expr`、`enabled`、`timeout`、`retry_count`；
/// `locked_by`/`locked_at`/`expired_at` 只由租约仓储在抢占/释放时修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expr: String, // 秒级cron表达式
    pub enabled: bool,
    pub timeout: i32, // 秒，同时决定租约时长
    pub retry_count: i32,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: i64, name: impl Into<String>, cron_expr: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            cron_expr: cron_expr.into(),
            enabled: true,
            timeout: 300,
            retry_count: 0,
            locked_by: None,
            locked_at: None,
            expired_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn lease_window(&self, now: DateTime<Utc>) -> LeaseWindow {
        LeaseWindow::starting_at(now, self.timeout)
    }
}

/// 一次租约的时间窗口，精确到毫秒
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseWindow {
    pub locked_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl LeaseWindow {
    pub fn starting_at(now: DateTime<Utc>, timeout_seconds: i32) -> Self {
        let locked_at = truncate_to_millis(now);
        Self {
            locked_at,
            expired_at: locked_at + Duration::seconds(i64::from(timeout_seconds.max(0))),
        }
    }
}

/// 抢占结果，`Busy` 表示租约被其他节点持有或本周期已执行过，不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    Busy,
}

/// 数据库列为 timestamp(3)，写入前统一截断到毫秒
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lease_window_truncates_to_millis() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
            + Duration::nanoseconds(123_456_789);
        let window = LeaseWindow::starting_at(now, 10);

        assert_eq!(window.locked_at.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(window.expired_at - window.locked_at, Duration::seconds(10));
    }

    #[test]
    fn test_negative_timeout_yields_empty_window() {
        let window = LeaseWindow::starting_at(Utc::now(), -5);
        assert_eq!(window.locked_at, window.expired_at);
    }
}
