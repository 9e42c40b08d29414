use async_trait::async_trait;
use hawthorn_core::{
    ExecutionStatus, LeaseOutcome, LeaseRepository, LeaseWindow, SchedulerError,
    SchedulerResult, Task, TaskExecution,
};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

pub struct PostgresLeaseRepository {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PostgresLeaseRepository {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }

    fn row_to_execution(row: &sqlx::postgres::PgRow) -> SchedulerResult<TaskExecution> {
        let status: String = row.try_get("status")?;
        Ok(TaskExecution {
            id: row.try_get("id")?,
            created_date: row.try_get("created_date")?,
            task_id: row.try_get("task_id")?,
            node_id: row.try_get("node_id")?,
            status: status.parse::<ExecutionStatus>()?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            error: row.try_get("error")?,
            trace_id: row.try_get("trace_id")?,
        })
    }
}

#[async_trait]
impl LeaseRepository for PostgresLeaseRepository {
    #[instrument(skip(self))]
    async fn list_enabled_tasks(&self) -> SchedulerResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, name, description, cron_expr, enabled, timeout, retry_count,
                   locked_by, locked_at, expired_at, created_at, updated_at
            FROM hawthorn_task
            WHERE enabled = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::repository("list_enabled_tasks"))?;

        debug!("查询到 {} 个已启用任务", tasks.len());
        Ok(tasks)
    }

    /// 行锁被占用时直接跳过，不等待
    #[instrument(skip(self, window), fields(task_id = %task_id))]
    async fn acquire_lease(
        &self,
        task_id: i64,
        node_id: &str,
        window: &LeaseWindow,
    ) -> SchedulerResult<LeaseOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(SchedulerError::repository("acquire_lease"))?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(SchedulerError::repository("acquire_lease"))?;

        sqlx::query(&format!("SET LOCAL lock_timeout = {}", self.statement_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::repository("acquire_lease"))?;

        let result = sqlx::query(
            r#"
            UPDATE hawthorn_task
            SET locked_by = $2, locked_at = $3, expired_at = $4
            WHERE id = (
                SELECT id FROM hawthorn_task
                WHERE id = $1
                  AND enabled = TRUE
                  AND (expired_at IS NULL OR expired_at < $3)
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(task_id)
        .bind(node_id)
        .bind(window.locked_at)
        .bind(window.expired_at)
        .execute(&mut *tx)
        .await
        .map_err(SchedulerError::repository("acquire_lease"))?;

        tx.commit()
            .await
            .map_err(SchedulerError::repository("acquire_lease"))?;

        Ok(if result.rows_affected() == 1 {
            LeaseOutcome::Acquired
        } else {
            LeaseOutcome::Busy
        })
    }

    #[instrument(skip(self, window), fields(task_id = %task_id))]
    async fn release_lease(&self, task_id: i64, window: &LeaseWindow) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE hawthorn_task
            SET locked_by = NULL, locked_at = NULL, expired_at = NULL
            WHERE id = $1 AND locked_at = $2 AND expired_at = $3
            "#,
        )
        .bind(task_id)
        .bind(window.locked_at)
        .bind(window.expired_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::repository("release_lease"))?;

        if result.rows_affected() == 0 {
            debug!("任务 {task_id} 的租约已不属于本周期，跳过释放");
        }
        Ok(())
    }

    #[instrument(skip(self, execution), fields(task_id = %execution.task_id, status = %execution.status))]
    async fn create_execution(&self, execution: &TaskExecution) -> SchedulerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO hawthorn_task_execution
                (created_date, task_id, node_id, status, start_time, end_time, error, trace_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(execution.created_date)
        .bind(execution.task_id)
        .bind(&execution.node_id)
        .bind(execution.status.as_str())
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(&execution.error)
        .bind(&execution.trace_id)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::repository("create_execution"))?;

        Ok(row.try_get("id")?)
    }

    async fn list_executions(&self, task_id: i64) -> SchedulerResult<Vec<TaskExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_date, task_id, node_id, status, start_time, end_time, error, trace_id
            FROM hawthorn_task_execution
            WHERE task_id = $1
            ORDER BY start_time DESC, id DESC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::repository("list_executions"))?;

        rows.iter().map(Self::row_to_execution).collect()
    }
}
