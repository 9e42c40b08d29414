use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::task::truncate_to_millis;
use crate::SchedulerError;

/// 执行结果状态，落库为 `success` / `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(SchedulerError::Configuration(format!(
                "未知的执行状态: {other}"
            ))),
        }
    }
}

/// 任务执行记录
///
/// 对应 `hawthorn_task_execution` 表，一个租约周期一条，写入后不再更新。
/// `created_date` 是分区/保留键，取开始时间的UTC日期。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// 插入前为空，由数据库生成
    pub id: Option<i64>,
    pub created_date: NaiveDate,
    pub task_id: i64,
    pub node_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: String,
    pub trace_id: String,
}

/// 周期开始时建立的执行记录草稿，状态在周期结束时一次性确定
#[derive(Debug, Clone)]
pub struct ExecutionStub {
    pub task_id: i64,
    pub node_id: String,
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
}

impl ExecutionStub {
    pub fn new(
        task_id: i64,
        node_id: impl Into<String>,
        trace_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            node_id: node_id.into(),
            trace_id: trace_id.into(),
            start_time: truncate_to_millis(start_time),
        }
    }

    pub fn finish(
        self,
        status: ExecutionStatus,
        error: impl Into<String>,
        end_time: DateTime<Utc>,
    ) -> TaskExecution {
        TaskExecution {
            id: None,
            created_date: self.start_time.date_naive(),
            task_id: self.task_id,
            node_id: self.node_id,
            status,
            start_time: self.start_time,
            end_time: Some(truncate_to_millis(end_time)),
            error: error.into(),
            trace_id: self.trace_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "success".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Success
        );
        assert_eq!(
            "failed".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Failed
        );
        assert!("running".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_finish_sets_partition_date_from_start() {
        let start = Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap()
            + Duration::microseconds(1_500);
        let stub = ExecutionStub::new(7, "node-a", "42", start);
        let record = stub.finish(
            ExecutionStatus::Failed,
            "boom",
            start + Duration::seconds(3),
        );

        assert_eq!(record.created_date, NaiveDate::from_ymd_opt(2026, 5, 31).unwrap());
        assert_eq!(record.start_time.timestamp_subsec_micros(), 1_000);
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error, "boom");
        assert!(record.id.is_none());
    }
}
