use std::sync::Arc;

use async_trait::async_trait;
use hawthorn_core::{
    LeaseOutcome, LeaseRepository, LeaseWindow, SchedulerResult, Task, TaskExecution,
};

use super::failover::DbInstance;
use super::pool::DatabasePool;
use super::postgres::PostgresLeaseRepository;
use super::sqlite::SqliteLeaseRepository;

/// 跟随主备切换的租约仓储
///
/// 每次调用都从 [`DbInstance`] 取当前连接池，再按数据库类型交给对应实现。
pub struct DbLeaseRepository {
    instance: Arc<DbInstance>,
    statement_timeout_ms: u64,
}

impl DbLeaseRepository {
    pub fn new(instance: Arc<DbInstance>, statement_timeout_ms: u64) -> Self {
        Self {
            instance,
            statement_timeout_ms,
        }
    }

    async fn repository(&self) -> SchedulerResult<Box<dyn LeaseRepository>> {
        Ok(match self.instance.current().await? {
            DatabasePool::PostgreSQL(pool) => Box::new(PostgresLeaseRepository::new(
                pool,
                self.statement_timeout_ms,
            )),
            DatabasePool::SQLite(pool) => Box::new(SqliteLeaseRepository::new(pool)),
        })
    }
}

#[async_trait]
impl LeaseRepository for DbLeaseRepository {
    async fn list_enabled_tasks(&self) -> SchedulerResult<Vec<Task>> {
        self.repository().await?.list_enabled_tasks().await
    }

    async fn acquire_lease(
        &self,
        task_id: i64,
        node_id: &str,
        window: &LeaseWindow,
    ) -> SchedulerResult<LeaseOutcome> {
        self.repository()
            .await?
            .acquire_lease(task_id, node_id, window)
            .await
    }

    async fn release_lease(&self, task_id: i64, window: &LeaseWindow) -> SchedulerResult<()> {
        self.repository()
            .await?
            .release_lease(task_id, window)
            .await
    }

    async fn create_execution(&self, execution: &TaskExecution) -> SchedulerResult<i64> {
        self.repository().await?.create_execution(execution).await
    }

    async fn list_executions(&self, task_id: i64) -> SchedulerResult<Vec<TaskExecution>> {
        self.repository().await?.list_executions(task_id).await
    }
}
