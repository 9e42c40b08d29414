//! # 数据模型
//!
//! 任务定义表 `hawthorn_task` 与执行记录表 `hawthorn_task_execution` 的映射，
//! 以及租约窗口等调度过程中使用的值类型。
//!
//! - [`Task`] 由外部管理端维护，调度器只读，租约字段除外
//! - [`TaskExecution`] 追加写入的审计记录，每个租约周期至多一条
//! - [`LeaseWindow`] 一次租约的 `(locked_at, expired_at)`，释放时按原值精确匹配

pub mod execution;
pub mod task;

pub use execution::*;
pub use task::*;
