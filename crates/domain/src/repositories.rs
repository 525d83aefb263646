//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则。
//! "同一任务至多一个活跃处理者"的正确性完全建立在
//! `claim_one` 的原子条件更新之上，而非进程内锁。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trainer_core::Result;
use uuid::Uuid;

use crate::entities::{TrainingTask, VectorRecord};

/// 训练任务仓储抽象
#[async_trait]
pub trait TrainingTaskRepository: Send + Sync {
    /// 批量插入任务，返回插入条数
    async fn insert_many(&self, tasks: Vec<TrainingTask>) -> Result<usize>;

    /// 原子认领一个可处理的任务
    ///
    /// 选择谓词：mode = chunk 且 lease_until <= now - lease_window。
    /// 认领即把 lease_until 置为 now，返回认领前的任务快照；必须保证
    /// 并发认领者不会同时拿到同一任务。队列为空返回 `Ok(None)`。
    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_window: chrono::Duration,
    ) -> Result<Option<TrainingTask>>;

    /// 暂停团队的全部任务（写入暂停哨兵），返回受影响条数
    async fn suspend_team(&self, team_id: &str) -> Result<u64>;

    /// 恢复团队被暂停的任务（重置租约为可认领），返回受影响条数
    ///
    /// 只恢复暂停哨兵，毒化任务保留待人工排查。
    async fn resume_team(&self, team_id: &str) -> Result<u64>;

    /// 毒化单个任务（写入毒化哨兵，任务保留）
    async fn mark_poisoned(&self, id: Uuid) -> Result<()>;

    /// 删除任务；任务不存在时返回 `Ok(false)`（幂等）
    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrainingTask>>;

    /// 待处理任务数（不含哨兵状态）
    async fn count_pending(&self) -> Result<u64>;
}

/// 检索索引抽象：持久化向量与原文
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, record: VectorRecord) -> Result<()>;
}
