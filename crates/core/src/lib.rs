//! 训练队列系统的基础类型
//!
//! 提供统一的错误类型和配置加载，供其他crate复用

pub mod config;
pub mod errors;

pub use config::{
    ApiConfig, AppConfig, DatabaseConfig, DatabaseDriver, EmbeddingConfig, IntakeConfig,
    ServicesConfig, WorkerConfig,
};
pub use errors::{EmbeddingError, Result, TrainerError};
