use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 任务表/执行记录表的读写失败
    #[error("仓储操作失败[{operation}]: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("数据源不可用: {name}")]
    DatabaseUnavailable { name: String },

    #[error("任务处理器 [{name}] 已注册")]
    DuplicateRegistration { name: String },

    #[error("任务处理器 [{name}] 未注册")]
    HandlerNotRegistered { name: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("未知异常: {0}")]
    UnexpectedFault(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("加解密错误: {0}")]
    Crypto(String),

    #[error("ID生成失败: {0}")]
    IdGeneration(String),
}

impl SchedulerError {
    /// 把sqlx错误包装成带操作名的仓储错误
    pub fn repository(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| SchedulerError::Repository { operation, source }
    }
}
