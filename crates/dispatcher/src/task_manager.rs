//! 定时任务管理器
//!
//! 负责把数据库中已启用的任务同步到进程内定时引擎，并在每次触发时完成一个执行周期：
//! 抢占租约 -> 按重试次数执行处理器 -> 释放租约 -> 登记执行记录。
//! 多节点之间的互斥完全依赖数据库租约，进程内只保证同一任务在本节点不重复建定时器。

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use hawthorn_core::models::ExecutionStub;
use hawthorn_core::{
    CronTaskConfig, ExecutionStatus, LeaseOutcome, LeaseRepository, SchedulerError,
    SchedulerResult, Task, TaskExecution, TraceIdGenerator,
};
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cron_utils::CronSchedule;
use crate::engine::{CronEngine, EntryId, Job};
use crate::handler::{TaskContext, TaskHandler, TaskParams};

/// 一个执行周期的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// 租约被占用，本周期未执行，也不登记
    LeaseBusy,
    Finished(TaskExecution),
}

/// 已建定时器的任务
struct ScheduledEntry {
    entry_id: EntryId,
    cron_expr: String,
    timeout: i32,
    /// 触发时读取的任务定义，对账时刷新
    definition: Arc<RwLock<Task>>,
}

impl ScheduledEntry {
    fn matches(&self, task: &Task) -> bool {
        self.cron_expr == task.cron_expr && self.timeout == task.timeout
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct TaskManager {
    node_id: String,
    config: CronTaskConfig,
    repository: Arc<dyn LeaseRepository>,
    id_generator: Arc<TraceIdGenerator>,
    engine: CronEngine,
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    entries: Mutex<HashMap<i64, ScheduledEntry>>,
    shutdown_tx: watch::Sender<bool>,
    sync_handle: Mutex<Option<JoinHandle<()>>>,
    in_flight: InFlight,
}

impl TaskManager {
    pub fn new(
        config: CronTaskConfig,
        repository: Arc<dyn LeaseRepository>,
        id_generator: Arc<TraceIdGenerator>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            node_id: config.node_id.clone(),
            config,
            repository,
            id_generator,
            engine: CronEngine::new(),
            handlers: RwLock::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            shutdown_tx,
            sync_handle: Mutex::new(None),
            in_flight: InFlight::default(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// 按任务名注册处理器，应在 [`TaskManager::start`] 之前完成
    pub async fn register<H>(&self, name: &str, handler: H) -> SchedulerResult<()>
    where
        H: TaskHandler + 'static,
    {
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(name) {
            return Err(SchedulerError::DuplicateRegistration {
                name: name.to_string(),
            });
        }

        handlers.insert(name.to_string(), Arc::new(handler));
        info!("任务处理器 [{name}] 注册成功");
        Ok(())
    }

    /// 先同步一次任务，失败则不启动；随后启动定时引擎和周期同步
    pub async fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        self.reconcile().await?;
        self.engine.start().await;

        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.sync_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.reconcile().await {
                            error!("同步任务定义失败: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("任务同步循环退出");
                        break;
                    }
                }
            }
        });
        *self.sync_handle.lock().await = Some(handle);

        info!(
            "定时任务管理器已启动: node_id={}, 同步间隔={:?}",
            self.node_id, period
        );
        Ok(())
    }

    /// 停止同步和触发，不等待在途任务，不关闭数据库连接
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        self.engine.stop().await;

        if let Some(handle) = self.sync_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("任务同步循环异常结束: {e}");
            }
        }
        info!("定时任务管理器已停止");
    }

    /// 停止信号，[`TaskManager::stop`] 后变为true
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 停止后最多等待 `grace` 让在途的执行周期结束
    pub async fn shutdown(&self, grace: Duration) {
        self.stop().await;

        if grace.is_zero() || self.in_flight.current() == 0 {
            return;
        }

        info!(
            "等待 {} 个在途任务结束，最长 {:?}",
            self.in_flight.current(),
            grace
        );
        if tokio::time::timeout(grace, self.in_flight.wait_idle())
            .await
            .is_err()
        {
            warn!("等待超时，仍有 {} 个任务在执行", self.in_flight.current());
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    /// 任务ID到定时条目ID的映射
    pub async fn scheduled_entries(&self) -> HashMap<i64, EntryId> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(task_id, entry)| (*task_id, entry.entry_id))
            .collect()
    }

    /// 把已启用任务同步到定时引擎
    ///
    /// 整个过程持有条目锁，同一时刻只有一次对账在修改条目。
    pub async fn reconcile(self: &Arc<Self>) -> SchedulerResult<()> {
        let tasks = self.repository.list_enabled_tasks().await?;

        let mut entries = self.entries.lock().await;
        let mut seen = HashSet::with_capacity(tasks.len());

        for task in tasks {
            seen.insert(task.id);

            if let Some(entry) = entries.get(&task.id) {
                if entry.matches(&task) {
                    *entry.definition.write().await = task;
                    continue;
                }
            }

            if let Some(stale) = entries.remove(&task.id) {
                self.engine.remove(stale.entry_id).await;
                info!(
                    "任务 [{}] 定义已变化，重建定时器: cron={}, timeout={}",
                    task.name, task.cron_expr, task.timeout
                );
            }

            if !self.handlers.read().await.contains_key(&task.name) {
                warn!("任务 [{}] 没有注册处理器，跳过调度", task.name);
                continue;
            }

            let schedule = match CronSchedule::new(&task.cron_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!("任务 [{}] 添加失败: {e}", task.name);
                    continue;
                }
            };

            let task_id = task.id;
            let cron_expr = task.cron_expr.clone();
            let timeout = task.timeout;
            info!("添加定时任务 [{}]: cron={}", task.name, cron_expr);

            let definition = Arc::new(RwLock::new(task));
            let entry_id = self
                .engine
                .add(schedule, self.trigger(Arc::clone(&definition)))
                .await;

            entries.insert(
                task_id,
                ScheduledEntry {
                    entry_id,
                    cron_expr,
                    timeout,
                    definition,
                },
            );
        }

        let removed: Vec<i64> = entries
            .keys()
            .filter(|task_id| !seen.contains(task_id))
            .copied()
            .collect();
        for task_id in removed {
            if let Some(entry) = entries.remove(&task_id) {
                self.engine.remove(entry.entry_id).await;
                info!("任务 {task_id} 已停用或删除，移除定时器");
            }
        }

        Ok(())
    }

    /// 定时引擎的回调：任何错误和panic都在这里截住
    fn trigger(self: &Arc<Self>, definition: Arc<RwLock<Task>>) -> Job {
        let manager: Weak<Self> = Arc::downgrade(self);

        Arc::new(move || {
            let manager = manager.clone();
            let definition = Arc::clone(&definition);

            async move {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                // 先计入在途再检查停止信号，停止后等待在途的一方不会漏掉这个周期
                let _guard = manager.in_flight.enter();
                if *manager.shutdown_tx.borrow() {
                    debug!("定时任务管理器已停止，忽略本次触发");
                    return;
                }
                let task = definition.read().await.clone();

                match AssertUnwindSafe(manager.run_traced(&task)).catch_unwind().await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        error!(task_id = task.id, task_name = %task.name, "执行周期异常: {e}");
                    }
                    Err(panic) => {
                        error!(
                            task_id = task.id,
                            task_name = %task.name,
                            "执行周期发生panic: {}",
                            panic_message(panic.as_ref())
                        );
                    }
                }
            }
            .boxed()
        })
    }

    /// 执行一个完整周期
    ///
    /// 租约被占用返回 [`ExecutionOutcome::LeaseBusy`]；登记执行记录失败返回
    /// [`SchedulerError::UnexpectedFault`]，此时租约已经释放。
    pub async fn execute(&self, task: &Task) -> SchedulerResult<ExecutionOutcome> {
        let _guard = self.in_flight.enter();
        self.run_traced(task).await
    }

    async fn run_traced(&self, task: &Task) -> SchedulerResult<ExecutionOutcome> {
        let trace_id = self.id_generator.next_trace_id()?;

        let span = info_span!(
            "task_execution",
            trace_id = %trace_id,
            task_id = task.id,
            task_name = %task.name,
        );
        self.run_cycle(task, trace_id).instrument(span).await
    }

    async fn run_cycle(&self, task: &Task, trace_id: String) -> SchedulerResult<ExecutionOutcome> {
        let now = Utc::now();
        let stub = ExecutionStub::new(task.id, &self.node_id, &trace_id, now);
        let window = task.lease_window(now);

        let (status, mut error) = match self
            .repository
            .acquire_lease(task.id, &self.node_id, &window)
            .await
        {
            Ok(LeaseOutcome::Busy) => {
                debug!("租约被占用，跳过本次执行");
                return Ok(ExecutionOutcome::LeaseBusy);
            }
            Ok(LeaseOutcome::Acquired) => self.run_attempts(task, &trace_id).await,
            Err(e) => {
                error!("抢占租约失败: {e}");
                (ExecutionStatus::Failed, format!("抢占租约失败: {e}"))
            }
        };

        if let Err(e) = self.repository.release_lease(task.id, &window).await {
            error!("释放租约失败: {e}");
            if !error.is_empty() {
                error.push_str("; ");
            }
            error.push_str(&format!("释放租约失败: {e}"));
        }

        let mut record = stub.finish(status, error, Utc::now());
        if self.config.not_record_task_execution {
            return Ok(ExecutionOutcome::Finished(record));
        }

        match self.repository.create_execution(&record).await {
            Ok(id) => {
                record.id = Some(id);
                Ok(ExecutionOutcome::Finished(record))
            }
            Err(e) => {
                error!("登记执行记录失败: {e}, status={}", record.status);
                Err(SchedulerError::UnexpectedFault(format!(
                    "登记执行记录失败: {e}"
                )))
            }
        }
    }

    /// 第 0..=retry_count 次尝试，首次成功即停止
    async fn run_attempts(&self, task: &Task, trace_id: &str) -> (ExecutionStatus, String) {
        let handler = self.handlers.read().await.get(&task.name).cloned();
        let Some(handler) = handler else {
            let err = SchedulerError::HandlerNotRegistered {
                name: task.name.clone(),
            };
            warn!("{err}");
            return (ExecutionStatus::Failed, err.to_string());
        };

        let last_attempt = u32::try_from(task.retry_count).unwrap_or(0);
        let mut last_error = String::new();

        for attempt in 0..=last_attempt {
            let ctx = TaskContext::new(trace_id, &self.node_id, self.shutdown_tx.subscribe());
            let params = TaskParams {
                task_id: task.id,
                task_name: task.name.clone(),
                attempt,
            };

            match AssertUnwindSafe(handler.run(ctx, params))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {
                    info!(attempt, "任务执行成功");
                    return (ExecutionStatus::Success, String::new());
                }
                Ok(Err(e)) => {
                    last_error = SchedulerError::TaskExecution(format!("{e:#}")).to_string();
                    warn!(attempt, "任务执行失败: {e:#}");
                }
                Err(panic) => {
                    let err = SchedulerError::UnexpectedFault(panic_message(panic.as_ref()));
                    error!(attempt, "任务执行发生panic: {err}");
                    return (ExecutionStatus::Failed, err.to_string());
                }
            }

            if attempt < last_attempt {
                tokio::time::sleep(self.config.retry_backoff()).await;
            }
        }

        (ExecutionStatus::Failed, last_error)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
