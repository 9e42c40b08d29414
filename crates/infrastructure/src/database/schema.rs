use hawthorn_core::{SchedulerError, SchedulerResult};
use tracing::info;

use super::pool::DatabasePool;

const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hawthorn_task (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(128) NOT NULL UNIQUE,
        description TEXT,
        cron_expr VARCHAR(64) NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        timeout INTEGER NOT NULL DEFAULT 300,
        retry_count INTEGER NOT NULL DEFAULT 0,
        locked_by VARCHAR(128),
        locked_at TIMESTAMPTZ(3),
        expired_at TIMESTAMPTZ(3),
        created_at TIMESTAMPTZ(3) DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMPTZ(3) DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hawthorn_task_execution (
        id BIGSERIAL,
        created_date DATE NOT NULL,
        task_id BIGINT NOT NULL,
        node_id VARCHAR(128) NOT NULL,
        status VARCHAR(16) NOT NULL,
        start_time TIMESTAMPTZ(3) NOT NULL,
        end_time TIMESTAMPTZ(3),
        error TEXT NOT NULL DEFAULT '',
        trace_id VARCHAR(64) NOT NULL DEFAULT '',
        PRIMARY KEY (id, created_date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hawthorn_task_execution_task ON hawthorn_task_execution (task_id, start_time)",
];

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hawthorn_task (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        cron_expr TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT 1,
        timeout INTEGER NOT NULL DEFAULT 300,
        retry_count INTEGER NOT NULL DEFAULT 0,
        locked_by TEXT,
        locked_at TEXT,
        expired_at TEXT,
        created_at TEXT,
        updated_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hawthorn_task_execution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_date TEXT NOT NULL,
        task_id INTEGER NOT NULL,
        node_id TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        error TEXT NOT NULL DEFAULT '',
        trace_id TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hawthorn_task_execution_task ON hawthorn_task_execution (task_id, start_time)",
];

/// 建表，已存在时跳过
pub async fn ensure_schema(pool: &DatabasePool) -> SchedulerResult<()> {
    match pool {
        DatabasePool::PostgreSQL(pool) => {
            for statement in POSTGRES_SCHEMA {
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .map_err(SchedulerError::repository("ensure_schema"))?;
            }
        }
        DatabasePool::SQLite(pool) => {
            for statement in SQLITE_SCHEMA {
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .map_err(SchedulerError::repository("ensure_schema"))?;
            }
        }
    }

    info!("数据表检查完成: hawthorn_task, hawthorn_task_execution");
    Ok(())
}
