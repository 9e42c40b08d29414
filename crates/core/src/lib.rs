pub mod config;
pub mod crypto;
pub mod errors;
pub mod id_generator;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{AppConfig, CronTaskConfig, DatabaseConfig, DatabasesConfig, DbInstanceConfig};
pub use crypto::PasswordCipher;
pub use errors::*;
pub use id_generator::TraceIdGenerator;
pub use models::{ExecutionStatus, LeaseOutcome, LeaseWindow, Task, TaskExecution};
pub use traits::LeaseRepository;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
