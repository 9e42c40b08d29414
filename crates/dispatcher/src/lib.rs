//! 定时任务调度
//!
//! 任务处理器注册、进程内定时引擎，以及基于数据库租约的执行周期。

pub mod cron_utils;
pub mod engine;
pub mod handler;
pub mod task_manager;

pub use cron_utils::CronSchedule;
pub use engine::{CronEngine, EntryId};
pub use handler::{TaskContext, TaskHandler, TaskParams};
pub use task_manager::{ExecutionOutcome, TaskManager};
