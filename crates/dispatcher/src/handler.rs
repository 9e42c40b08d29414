use std::future::Future;

use async_trait::async_trait;
use tokio::sync::watch;

/// 单次尝试的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParams {
    pub task_id: i64,
    pub task_name: String,
    /// 从0开始
    pub attempt: u32,
}

/// 任务执行上下文
///
/// 停止信号只供任务自行检查，调度器不会中断正在运行的任务。
#[derive(Debug, Clone)]
pub struct TaskContext {
    trace_id: String,
    node_id: String,
    shutdown: watch::Receiver<bool>,
}

impl TaskContext {
    pub fn new(
        trace_id: impl Into<String>,
        node_id: impl Into<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            node_id: node_id.into(),
            shutdown,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// 等待调度器停止；发送端已释放时立即返回
    pub async fn shutdown_requested(&self) {
        let mut shutdown = self.shutdown.clone();
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    }
}

/// 任务处理器，失败时返回带描述的错误，重试由调度器负责
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext, params: TaskParams) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(TaskContext, TaskParams) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext, params: TaskParams) -> anyhow::Result<()> {
        (self)(ctx, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = |ctx: TaskContext, params: TaskParams| async move {
            if params.attempt == 0 {
                anyhow::bail!("第{}次失败: {}", params.attempt, ctx.trace_id());
            }
            Ok(())
        };

        let (_tx, rx) = watch::channel(false);
        let ctx = TaskContext::new("42", "node-a", rx);
        let mut params = TaskParams {
            task_id: 1,
            task_name: "sync".to_string(),
            attempt: 0,
        };

        let err = handler.run(ctx.clone(), params.clone()).await.unwrap_err();
        assert_eq!(err.to_string(), "第0次失败: 42");

        params.attempt = 1;
        assert!(handler.run(ctx, params).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_signal_visible_to_context() {
        let (tx, rx) = watch::channel(false);
        let ctx = TaskContext::new("1", "node-a", rx);
        assert!(!ctx.is_shutting_down());

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.shutdown_requested().await })
        };
        tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.is_shutting_down());
    }
}
