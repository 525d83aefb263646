//! 基础设施层：仓储与外部协作方的具体实现
//!
//! - `database`: PostgreSQL任务仓储与向量索引
//! - `memory`: 内存实现，用于嵌入式部署和测试
//! - `http_embedding`: OpenAI兼容的向量模型客户端
//! - `collaborators`: 余额、计费、通知的HTTP客户端

pub mod collaborators;
pub mod database;
pub mod http_embedding;
pub mod memory;

pub use collaborators::{HttpBalanceService, HttpBillingReporter, HttpNotificationService};
pub use database::{connect, init_schema, PostgresTaskRepository, PostgresVectorStore};
pub use http_embedding::HttpEmbeddingProvider;
pub use memory::{
    MemoryTaskRepository, MemoryVectorStore, NoopBalanceService, NoopBillingReporter,
    NoopNotificationService,
};
