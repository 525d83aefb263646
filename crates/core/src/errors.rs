use thiserror::Error;
use uuid::Uuid;

/// 向量模型调用错误
///
/// 区分可重试错误与内容致命错误，失败分类器据此决定任务去向。
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("无效的向量化请求 (状态码 {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("向量模型限流")]
    RateLimited,

    #[error("向量模型服务不可用: {0}")]
    Unavailable(String),

    #[error("未知的向量模型错误: {0}")]
    Unknown(String),
}

/// 训练队列错误类型定义
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },

    #[error("向量生成错误: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("团队余额不足: {team_id}")]
    InsufficientBalance { team_id: String },

    #[error("余额服务不可用: {0}")]
    BalanceUnavailable(String),

    #[error("通知服务错误: {0}")]
    Notification(String),

    #[error("向量索引写入错误: {0}")]
    VectorStore(String),

    #[error("计费上报错误: {0}")]
    Billing(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的任务参数: {0}")]
    InvalidParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl TrainerError {
    /// 内容致命错误：任务本身无法被向量化，重试不会成功
    ///
    /// 其余错误一律按瞬时错误处理，依靠租约过期重试。
    pub fn is_content_fatal(&self) -> bool {
        matches!(
            self,
            TrainerError::Embedding(EmbeddingError::InvalidRequest { .. })
                | TrainerError::InvalidParams(_)
        )
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, TrainerError>;
