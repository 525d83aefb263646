//! 外部协作方端口
//!
//! 向量模型、余额、计费、通知均为远程协作方，这里只约定接口，
//! 具体实现在infrastructure层。

use async_trait::async_trait;
use trainer_core::Result;

use crate::entities::{Embedding, Notification, UsageReport};

/// 向量模型提供方
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 对文本生成向量，返回向量与消耗的token数
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding>;
}

/// 余额服务：处理任务前的准入检查
#[async_trait]
pub trait BalanceService: Send + Sync {
    /// 余额充足返回 `Ok(())`；不足返回
    /// `TrainerError::InsufficientBalance`；服务异常返回
    /// `TrainerError::BalanceUnavailable`
    async fn check_balance(&self, team_id: &str) -> Result<()>;
}

/// 计费上报
#[async_trait]
pub trait BillingReporter: Send + Sync {
    async fn report_usage(&self, report: UsageReport) -> Result<()>;
}

/// 站内通知服务（尽力而为）
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// 队列唤醒端口
///
/// 入库成功或团队恢复后触发，唤醒是链重启的唯一机制（无周期轮询）。
pub trait QueueWaker: Send + Sync {
    /// 唤醒生成链（非阻塞）
    fn wake(&self);

    /// 当前在途任务数
    fn in_flight(&self) -> usize;
}
