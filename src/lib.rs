//! hawthorn：数据库协调的多节点定时任务调度
//!
//! 各节点按相同的任务表调度，同一次触发只有拿到租约的节点执行。

pub mod app;
pub mod shutdown;

pub use app::Framework;
pub use shutdown::wait_for_shutdown_signal;

pub use hawthorn_core::{AppConfig, SchedulerError, SchedulerResult};
pub use hawthorn_dispatcher::{TaskContext, TaskHandler, TaskParams};
