use std::str::FromStr;
use std::time::Duration;

use hawthorn_core::{DbInstanceConfig, SchedulerResult};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// 按连接串判断数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

/// 单个数据库实例的连接池
///
/// 克隆只复制池句柄，底层连接共享。
#[derive(Debug, Clone)]
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// 按实例配置建立连接池，密码在此解密并替换占位符
    ///
    /// `lock_timeout` 只作用于SQLite连接的 `busy_timeout`：SQLite没有语句级的锁等待设置，
    /// PostgreSQL在租约SQL里用 `SET LOCAL` 单独限定。
    pub async fn connect(config: &DbInstanceConfig, lock_timeout: Duration) -> SchedulerResult<Self> {
        let url = config.connection_url()?;

        match DatabaseType::from_url(&url) {
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::from_str(&url)?;
                if let Some(schema) = config.schema() {
                    options = options.options([("search_path", schema)]);
                }

                let pool = PgPoolOptions::new()
                    .max_connections(config.max_open_conns())
                    .min_connections(config.min_idle_conns())
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .idle_timeout(IDLE_TIMEOUT)
                    .max_lifetime(config.conn_max_lifetime())
                    .connect_with(options)
                    .await?;
                debug!("PostgreSQL连接池已建立: center={}, id={}", config.center(), config.id());
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&url)?.busy_timeout(lock_timeout);

                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_open_conns())
                    .min_connections(config.min_idle_conns())
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .max_lifetime(config.conn_max_lifetime())
                    .connect_with(options)
                    .await?;
                debug!("SQLite连接池已建立: center={}, id={}", config.center(), config.id());
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// 健康检查
    pub async fn ping(&self) -> SchedulerResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.is_closed(),
            DatabasePool::SQLite(pool) => pool.is_closed(),
        }
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}
