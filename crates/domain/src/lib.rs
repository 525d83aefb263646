//! 领域层：训练任务实体、仓储抽象与外部协作方端口

pub mod entities;
pub mod intake;
pub mod ports;
pub mod repositories;

pub use entities::{
    Embedding, IndexHint, Notification, RawChunk, TrainingMode, TrainingTask, UsageReport,
    VectorRecord,
};
pub use intake::{classify_batch, estimate_tokens, ClassifiedBatch};
pub use ports::{
    BalanceService, BillingReporter, EmbeddingProvider, NotificationService, QueueWaker,
};
pub use repositories::{TrainingTaskRepository, VectorStore};
