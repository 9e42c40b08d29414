use std::sync::Arc;

use hawthorn_core::{AppConfig, SchedulerResult, TraceIdGenerator};
use hawthorn_dispatcher::{TaskHandler, TaskManager};
use hawthorn_infrastructure::{ensure_schema, DbLeaseRepository, DbManager};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::shutdown::wait_for_shutdown_signal;

/// 应用装配：数据源管理器 -> 租约仓储 -> 追踪号生成器 -> 定时任务管理器
pub struct Framework {
    config: AppConfig,
    db_manager: Arc<DbManager>,
    task_manager: Arc<TaskManager>,
    health_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Framework {
    pub async fn new(config: AppConfig) -> SchedulerResult<Self> {
        let db_manager = Arc::new(
            DbManager::initialize(&config.databases, config.cron_task.lease_timeout()).await?,
        );

        let repository = Arc::new(DbLeaseRepository::new(
            db_manager.server_instance()?,
            config.cron_task.lease_statement_timeout_ms,
        ));
        let id_generator = Arc::new(TraceIdGenerator::new(config.app.worker_id));
        let task_manager = Arc::new(TaskManager::new(
            config.cron_task.clone(),
            repository,
            id_generator,
        ));

        info!(
            "应用 {} 初始化完成，节点: {}",
            config.app.name, config.cron_task.node_id
        );

        Ok(Self {
            config,
            db_manager,
            task_manager,
            health_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db_manager(&self) -> &Arc<DbManager> {
        &self.db_manager
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.task_manager
    }

    /// 在服务数据源上建表
    pub async fn auto_migrate(&self) -> SchedulerResult<()> {
        let pool = self.db_manager.server_db().await?;
        ensure_schema(&pool).await
    }

    pub async fn register_task<H>(&self, name: &str, handler: H) -> SchedulerResult<()>
    where
        H: TaskHandler + 'static,
    {
        self.task_manager.register(name, handler).await
    }

    pub async fn start(&self) -> SchedulerResult<()> {
        self.task_manager.start().await?;

        // 健康检查循环与定时任务管理器共用同一个停止信号
        *self.health_handle.lock().await = self
            .db_manager
            .spawn_health_monitor(self.task_manager.shutdown_signal());

        info!("应用 {} 已启动", self.config.app.name);
        Ok(())
    }

    /// 停止调度、等待在途任务（按配置的宽限时间）、关闭数据库连接
    pub async fn stop(&self) {
        self.task_manager
            .shutdown(self.config.cron_task.shutdown_grace())
            .await;

        if let Some(handle) = self.health_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("健康检查任务异常结束: {e}");
            }
        }

        self.db_manager.close_all().await;
        info!("应用 {} 已停止", self.config.app.name);
    }

    /// 启动并阻塞到收到退出信号
    pub async fn run_until_signal(&self) -> SchedulerResult<()> {
        self.start().await?;
        wait_for_shutdown_signal().await;

        info!("收到关闭信号，开始优雅关闭...");
        self.stop().await;
        Ok(())
    }
}
