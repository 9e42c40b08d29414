//! 租约仓储接口定义
//!
//! 调度器对数据库的全部访问都经过 [`LeaseRepository`]：
//! - 读取已启用的任务定义，用于对账
//! - 租约的抢占与释放（条件更新，保证同一任务同一时刻至多一个持有者）
//! - 追加执行审计记录
//!
//! 实现方每次调用都应从数据源管理器取当前可用连接，不跨调用缓存连接，
//! 这样主备切换后的下一次调用自然落到新的连接上。

use async_trait::async_trait;

use crate::{
    models::{LeaseOutcome, LeaseWindow, Task, TaskExecution},
    SchedulerResult,
};

#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// 查询全部 `enabled = true` 的任务
    async fn list_enabled_tasks(&self) -> SchedulerResult<Vec<Task>>;

    /// 抢占租约
    ///
    /// 仅当任务已启用且租约为空或已过期时，把租约字段更新为 `window`。
    /// 没有行被更新时返回 [`LeaseOutcome::Busy`]，数据库层面的失败返回错误。
    async fn acquire_lease(
        &self,
        task_id: i64,
        node_id: &str,
        window: &LeaseWindow,
    ) -> SchedulerResult<LeaseOutcome>;

    /// 释放租约
    ///
    /// 只有租约字段仍等于本周期写入的 `window` 时才清空；不匹配时静默返回。
    async fn release_lease(&self, task_id: i64, window: &LeaseWindow) -> SchedulerResult<()>;

    /// 插入执行记录，返回生成的ID
    async fn create_execution(&self, execution: &TaskExecution) -> SchedulerResult<i64>;

    /// 按开始时间倒序列出某任务的执行记录
    async fn list_executions(&self, task_id: i64) -> SchedulerResult<Vec<TaskExecution>>;
}
