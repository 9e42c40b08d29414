//! 配置管理
//!
//! 配置文件为TOML格式，通过 `config` crate 加载，环境变量 `HAWTHORN__<section>__<key>` 可覆盖。
//! 加载顺序：文件 -> 环境变量 -> 补全默认值 -> 校验。

pub mod models;

pub use models::*;
