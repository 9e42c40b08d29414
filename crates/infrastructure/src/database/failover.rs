//! 数据源主备管理
//!
//! 每个逻辑数据源对应一个 [`DbInstance`]，持有主库和可选备库的连接池以及“当前”指向。
//! 健康检查循环按固定间隔探测当前连接：不健康时切到另一侧，备库在用时持续探测主库并在其恢复后切回。
//! 调用方每次取连接都读当前指向，切换对下一次调用生效。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hawthorn_core::{
    DatabaseConfig, DatabasesConfig, DbInstanceConfig, SchedulerError, SchedulerResult,
};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pool::DatabasePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Primary,
    Standby,
}

impl Side {
    fn other(self) -> Self {
        match self {
            Side::Primary => Side::Standby,
            Side::Standby => Side::Primary,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Side::Primary => "主库",
            Side::Standby => "备库",
        }
    }
}

/// 一侧的连接池及其配置标识
#[derive(Debug, Clone)]
struct SideConnection {
    pool: DatabasePool,
    center: String,
    id: String,
}

/// 带元数据的连接句柄
#[derive(Debug, Clone)]
pub struct DbHandle {
    pub name: String,
    pub cluster: String,
    pub center: String,
    pub id: String,
    pub using_standby: bool,
    pub pool: DatabasePool,
}

#[derive(Default)]
struct InstanceState {
    primary: Option<SideConnection>,
    standby: Option<SideConnection>,
    using_standby: bool,
}

impl InstanceState {
    fn current_side(&self) -> Side {
        if self.using_standby {
            Side::Standby
        } else {
            Side::Primary
        }
    }

    fn side(&self, side: Side) -> Option<&SideConnection> {
        match side {
            Side::Primary => self.primary.as_ref(),
            Side::Standby => self.standby.as_ref(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Option<SideConnection> {
        match side {
            Side::Primary => &mut self.primary,
            Side::Standby => &mut self.standby,
        }
    }
}

/// 单个逻辑数据源的主备连接
pub struct DbInstance {
    name: String,
    config: DatabaseConfig,
    lock_timeout: Duration,
    state: RwLock<InstanceState>,
}

impl DbInstance {
    /// 优先连接主库，失败时连接备库；两侧都连不上时返回错误
    pub async fn connect(
        name: &str,
        config: DatabaseConfig,
        lock_timeout: Duration,
    ) -> SchedulerResult<Self> {
        let mut state = InstanceState::default();

        match open_side(&config.primary, lock_timeout).await {
            Ok(conn) => {
                state.primary = Some(conn);
            }
            Err(e) => {
                error!("数据源 {name} 主库连接失败: {e}");
                if !config.has_standby() {
                    return Err(SchedulerError::DatabaseUnavailable {
                        name: name.to_string(),
                    });
                }

                match open_side(&config.standby, lock_timeout).await {
                    Ok(conn) => {
                        warn!("数据源 {name} 启动时使用备库");
                        state.standby = Some(conn);
                        state.using_standby = true;
                    }
                    Err(e) => {
                        error!("数据源 {name} 备库连接失败: {e}");
                        return Err(SchedulerError::DatabaseUnavailable {
                            name: name.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "数据源 {name} 初始化完成，当前使用{}",
            state.current_side().label()
        );

        Ok(Self {
            name: name.to_string(),
            config,
            lock_timeout,
            state: RwLock::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &str {
        &self.config.cluster
    }

    pub async fn is_using_standby(&self) -> bool {
        self.state.read().await.using_standby
    }

    /// 当前可用的连接池
    pub async fn current(&self) -> SchedulerResult<DatabasePool> {
        let state = self.state.read().await;
        state
            .side(state.current_side())
            .map(|conn| conn.pool.clone())
            .ok_or_else(|| SchedulerError::DatabaseUnavailable {
                name: self.name.clone(),
            })
    }

    pub async fn handle(&self) -> SchedulerResult<DbHandle> {
        let state = self.state.read().await;
        let conn = state.side(state.current_side()).ok_or_else(|| {
            SchedulerError::DatabaseUnavailable {
                name: self.name.clone(),
            }
        })?;

        Ok(DbHandle {
            name: self.name.clone(),
            cluster: self.config.cluster.clone(),
            center: conn.center.clone(),
            id: conn.id.clone(),
            using_standby: state.using_standby,
            pool: conn.pool.clone(),
        })
    }

    /// 一次健康检查
    ///
    /// 探测在锁外进行，只有切换时才短暂持有写锁。
    pub async fn check_and_switch(&self) {
        let (current, current_side) = {
            let state = self.state.read().await;
            let side = state.current_side();
            (state.side(side).map(|conn| conn.pool.clone()), side)
        };

        let healthy = match &current {
            Some(pool) => is_healthy(pool).await,
            None => false,
        };

        if healthy {
            if current_side == Side::Standby {
                self.try_switch(Side::Primary).await;
            }
            return;
        }

        warn!("数据源 {} 的{}不可用", self.name, current_side.label());

        let target = current_side.other();
        if target == Side::Standby && !self.config.has_standby() {
            warn!("数据源 {} 未配置备库，等待主库恢复", self.name);
            self.try_switch(Side::Primary).await;
            return;
        }

        if !self.try_switch(target).await {
            error!("数据源 {} 主备均不可用", self.name);
        }
    }

    /// 确保目标侧连接可用并切换过去，成功返回true
    async fn try_switch(&self, target: Side) -> bool {
        let Some(pool) = self.ensure_side(target).await else {
            return false;
        };

        if !is_healthy(&pool).await {
            debug!("数据源 {} 的{}探测失败", self.name, target.label());
            return false;
        }

        let mut state = self.state.write().await;
        if state.current_side() != target {
            state.using_standby = target == Side::Standby;
            info!("数据源 {} 已切换到{}", self.name, target.label());
        }
        true
    }

    /// 取目标侧连接池，不存在或已关闭时按该侧配置重新连接
    async fn ensure_side(&self, side: Side) -> Option<DatabasePool> {
        {
            let state = self.state.read().await;
            if let Some(conn) = state.side(side).filter(|conn| !conn.pool.is_closed()) {
                return Some(conn.pool.clone());
            }
        }

        let config = match side {
            Side::Primary => &self.config.primary,
            Side::Standby => &self.config.standby,
        };

        match open_side(config, self.lock_timeout).await {
            Ok(conn) => {
                let pool = conn.pool.clone();
                let mut state = self.state.write().await;
                *state.side_mut(side) = Some(conn);
                info!("数据源 {} 的{}已重新连接", self.name, side.label());
                Some(pool)
            }
            Err(e) => {
                debug!("数据源 {} 的{}连接失败: {e}", self.name, side.label());
                None
            }
        }
    }

    pub async fn close(&self) {
        let pools: Vec<DatabasePool> = {
            let mut state = self.state.write().await;
            [state.primary.take(), state.standby.take()]
                .into_iter()
                .flatten()
                .map(|conn| conn.pool)
                .collect()
        };

        for pool in pools {
            pool.close().await;
        }
    }
}

async fn open_side(
    config: &DbInstanceConfig,
    lock_timeout: Duration,
) -> SchedulerResult<SideConnection> {
    let pool = DatabasePool::connect(config, lock_timeout).await?;
    Ok(SideConnection {
        pool,
        center: config.center().to_string(),
        id: config.id().to_string(),
    })
}

async fn is_healthy(pool: &DatabasePool) -> bool {
    !pool.is_closed() && pool.ping().await.is_ok()
}

/// 全部逻辑数据源的管理器
pub struct DbManager {
    instances: HashMap<String, Arc<DbInstance>>,
    server_database: String,
    health_interval: Option<Duration>,
}

impl DbManager {
    /// 按配置连接全部数据源，任一数据源主备都不可用时失败
    ///
    /// `lock_timeout` 为SQLite连接的锁等待上限，取租约SQL的超时配置。
    pub async fn initialize(
        config: &DatabasesConfig,
        lock_timeout: Duration,
    ) -> SchedulerResult<Self> {
        let mut instances = HashMap::new();
        for (name, database) in &config.lists {
            let instance = DbInstance::connect(name, database.clone(), lock_timeout).await?;
            instances.insert(name.clone(), Arc::new(instance));
        }

        Ok(Self {
            instances,
            server_database: config.server_database.clone(),
            health_interval: config.health_monitor_interval(),
        })
    }

    pub fn instance(&self, name: &str) -> SchedulerResult<Arc<DbInstance>> {
        self.instances
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::DatabaseUnavailable {
                name: name.to_string(),
            })
    }

    pub fn server_instance(&self) -> SchedulerResult<Arc<DbInstance>> {
        self.instance(&self.server_database)
    }

    pub async fn get_db(&self, name: &str) -> SchedulerResult<DatabasePool> {
        self.instance(name)?.current().await
    }

    pub async fn get_db_info(&self, name: &str) -> SchedulerResult<DbHandle> {
        self.instance(name)?.handle().await
    }

    /// 服务数据源的当前连接
    pub async fn server_db(&self) -> SchedulerResult<DatabasePool> {
        self.get_db(&self.server_database).await
    }

    /// 同一集群标签下全部数据源的当前连接，按名称排序
    pub async fn get_by_cluster(&self, cluster: &str) -> Vec<DbHandle> {
        let mut names: Vec<&String> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.cluster() == cluster)
            .map(|(name, _)| name)
            .collect();
        names.sort();

        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            match self.instances[name].handle().await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("获取数据源 {name} 连接失败: {e}"),
            }
        }
        handles
    }

    pub async fn check_all(&self) {
        for instance in self.instances.values() {
            instance.check_and_switch().await;
        }
    }

    /// 启动健康检查循环，未配置间隔时返回None
    ///
    /// 停止信号变为true或发送端释放时循环退出。
    pub fn spawn_health_monitor(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        let Some(period) = self.health_interval else {
            info!("未配置健康检查间隔，主备切换已关闭");
            return None;
        };

        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次tick立即返回
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.check_all().await;
                    }
                    _ = async { let _ = shutdown_rx.wait_for(|stopping| *stopping).await; } => {
                        info!("数据源健康检查已停止");
                        break;
                    }
                }
            }
        }))
    }

    pub async fn close_all(&self) {
        for instance in self.instances.values() {
            instance.close().await;
        }
        info!("全部数据库连接已关闭");
    }
}
