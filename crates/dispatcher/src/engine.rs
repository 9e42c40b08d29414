//! 进程内定时触发引擎
//!
//! 每个条目一个后台循环：睡到下一次触发时间，把作业交给独立的tokio任务执行后立即进入下一轮，
//! 因此同一条目的多次触发之间、不同条目之间都可以并发。
//! 停止引擎只结束触发循环，已经开始的作业不受影响。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cron_utils::CronSchedule;

pub type EntryId = u64;

/// 触发时执行的作业
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct EngineEntry {
    schedule: CronSchedule,
    job: Job,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct EngineState {
    next_id: EntryId,
    running: bool,
    entries: HashMap<EntryId, EngineEntry>,
}

#[derive(Default)]
pub struct CronEngine {
    state: Mutex<EngineState>,
}

impl CronEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加条目，引擎运行中时立即开始计时
    pub async fn add(&self, schedule: CronSchedule, job: Job) -> EntryId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;

        let handle = state
            .running
            .then(|| spawn_trigger_loop(id, schedule.clone(), Arc::clone(&job)));
        state.entries.insert(
            id,
            EngineEntry {
                schedule,
                job,
                handle,
            },
        );

        debug!("定时条目 {id} 已添加");
        id
    }

    pub async fn remove(&self, id: EntryId) -> bool {
        let removed = self.state.lock().await.entries.remove(&id);
        match removed {
            Some(entry) => {
                if let Some(handle) = entry.handle {
                    handle.abort();
                }
                debug!("定时条目 {id} 已移除");
                true
            }
            None => false,
        }
    }

    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.running {
            return;
        }
        state.running = true;

        for (id, entry) in state.entries.iter_mut() {
            entry.handle = Some(spawn_trigger_loop(
                *id,
                entry.schedule.clone(),
                Arc::clone(&entry.job),
            ));
        }
        info!("定时引擎已启动，共 {} 个条目", state.entries.len());
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.running = false;

        for entry in state.entries.values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
        info!("定时引擎已停止");
    }
}

fn spawn_trigger_loop(id: EntryId, schedule: CronSchedule, job: Job) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = Utc::now();
        loop {
            let Some(next) = schedule.next_after(cursor) else {
                debug!("定时条目 {id} 没有后续触发时间");
                break;
            };

            sleep_until(next).await;
            tokio::spawn(job());

            // 错过的触发点不补
            cursor = next.max(Utc::now());
        }
    })
}

/// 按墙上时钟睡到指定时刻
async fn sleep_until(deadline: DateTime<Utc>) {
    loop {
        let now = Utc::now();
        if now >= deadline {
            return;
        }
        match (deadline - now).to_std() {
            Ok(wait) => tokio::time::sleep(wait).await,
            Err(_) => return,
        }
    }
}
