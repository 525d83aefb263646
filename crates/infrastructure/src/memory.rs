//! 内存实现
//!
//! 任务仓储与向量索引的进程内版本，语义与PostgreSQL实现一致，
//! 用于嵌入式部署和测试。锁内无await，认领的原子性由互斥锁保证。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use trainer_core::{Result, TrainerError};
use trainer_domain::entities::{poison_sentinel, suspend_sentinel, unleased};
use trainer_domain::{
    BalanceService, BillingReporter, Notification, NotificationService, TrainingTask,
    TrainingTaskRepository, UsageReport, VectorRecord, VectorStore,
};

/// 内存任务仓储
#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: Mutex<HashMap<Uuid, TrainingTask>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrainingTaskRepository for MemoryTaskRepository {
    async fn insert_many(&self, tasks: Vec<TrainingTask>) -> Result<usize> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        let count = tasks.len();
        for task in tasks {
            guard.insert(task.id, task);
        }
        Ok(count)
    }

    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_window: chrono::Duration,
    ) -> Result<Option<TrainingTask>> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        let candidate = guard
            .values()
            .filter(|task| task.is_claimable(now, lease_window))
            .min_by_key(|task| (task.lease_until, task.created_at, task.id))
            .map(|task| task.id);

        match candidate {
            Some(id) => {
                let task = guard.get_mut(&id).expect("候选任务刚被查到");
                // 返回认领前的快照，租约写入存储
                let snapshot = task.clone();
                task.lease_until = now;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn suspend_team(&self, team_id: &str) -> Result<u64> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        let mut count = 0u64;
        for task in guard.values_mut() {
            if task.team_id == team_id && !task.is_poisoned() {
                task.lease_until = suspend_sentinel();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn resume_team(&self, team_id: &str) -> Result<u64> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        let mut count = 0u64;
        for task in guard.values_mut() {
            if task.team_id == team_id && task.is_suspended() {
                task.lease_until = unleased();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_poisoned(&self, id: Uuid) -> Result<()> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        match guard.get_mut(&id) {
            Some(task) => {
                task.lease_until = poison_sentinel();
                Ok(())
            }
            None => Err(TrainerError::TaskNotFound { id }),
        }
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let mut guard = self.tasks.lock().expect("任务表锁中毒");
        Ok(guard.remove(&id).is_some())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrainingTask>> {
        let guard = self.tasks.lock().expect("任务表锁中毒");
        Ok(guard.get(&id).cloned())
    }

    async fn count_pending(&self) -> Result<u64> {
        let guard = self.tasks.lock().expect("任务表锁中毒");
        let count = guard
            .values()
            .filter(|task| !task.is_poisoned() && !task.is_suspended())
            .count();
        Ok(count as u64)
    }
}

/// 内存向量索引
#[derive(Default)]
pub struct MemoryVectorStore {
    records: Mutex<Vec<VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<VectorRecord> {
        self.records.lock().expect("向量表锁中毒").clone()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        self.records.lock().expect("向量表锁中毒").push(record);
        Ok(())
    }
}

/// 空实现余额服务：永远充足，用于未接入账户服务的部署
pub struct NoopBalanceService;

#[async_trait]
impl BalanceService for NoopBalanceService {
    async fn check_balance(&self, _team_id: &str) -> Result<()> {
        Ok(())
    }
}

/// 空实现计费上报：只记录日志
pub struct NoopBillingReporter;

#[async_trait]
impl BillingReporter for NoopBillingReporter {
    async fn report_usage(&self, report: UsageReport) -> Result<()> {
        debug!(
            team_id = %report.team_id,
            tokens = report.tokens,
            model = %report.model,
            "计费上报（空实现）"
        );
        Ok(())
    }
}

/// 空实现通知服务：只记录日志
pub struct NoopNotificationService;

#[async_trait]
impl NotificationService for NoopNotificationService {
    async fn notify(&self, notification: Notification) -> Result<()> {
        debug!(tmb_id = %notification.tmb_id, title = %notification.title, "站内通知（空实现）");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trainer_domain::TrainingMode;

    fn task(team_id: &str, mode: TrainingMode) -> TrainingTask {
        TrainingTask {
            id: Uuid::new_v4(),
            team_id: team_id.to_string(),
            tmb_id: "tmb-1".to_string(),
            dataset_id: "ds-1".to_string(),
            collection_id: "col-1".to_string(),
            mode,
            prompt: None,
            model: "text-embedding-ada-002".to_string(),
            q: "问题".to_string(),
            a: String::new(),
            indexes: vec![],
            lease_until: unleased(),
            bill_id: None,
            created_at: Utc::now(),
        }
    }

    fn window() -> chrono::Duration {
        chrono::Duration::seconds(60)
    }

    #[tokio::test]
    async fn test_claim_returns_inserted_task_and_leases_it() {
        let repo = MemoryTaskRepository::new();
        let inserted = task("team-1", TrainingMode::Chunk);
        repo.insert_many(vec![inserted.clone()]).await.unwrap();

        let now = Utc::now();
        let claimed = repo.claim_one(now, window()).await.unwrap().unwrap();
        assert_eq!(claimed.id, inserted.id);
        // 返回认领前的快照，存储中的租约已更新为认领时刻
        assert_eq!(claimed.lease_until, unleased());
        let stored = repo.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(stored.lease_until, now);

        // 租约内不可再次认领
        assert!(repo.claim_one(now, window()).await.unwrap().is_none());
        // 租约过期后恢复可认领
        let later = now + chrono::Duration::seconds(61);
        assert!(repo.claim_one(later, window()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_skips_qa_mode() {
        let repo = MemoryTaskRepository::new();
        repo.insert_many(vec![task("team-1", TrainingMode::Qa)])
            .await
            .unwrap();
        assert!(repo.claim_one(Utc::now(), window()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claim_has_single_winner() {
        let repo = Arc::new(MemoryTaskRepository::new());
        repo.insert_many(vec![task("team-1", TrainingMode::Chunk)])
            .await
            .unwrap();

        let now = Utc::now();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(
                async move { repo.claim_one(now, window()).await },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "同一任务被多个认领者同时拿到");
    }

    #[tokio::test]
    async fn test_suspend_team_only_touches_that_team() {
        let repo = MemoryTaskRepository::new();
        let t1 = task("team-1", TrainingMode::Chunk);
        let t2 = task("team-1", TrainingMode::Chunk);
        let other = task("team-2", TrainingMode::Chunk);
        repo.insert_many(vec![t1.clone(), t2.clone(), other.clone()])
            .await
            .unwrap();

        let count = repo.suspend_team("team-1").await.unwrap();
        assert_eq!(count, 2);

        assert!(repo.find_by_id(t1.id).await.unwrap().unwrap().is_suspended());
        assert!(repo.find_by_id(t2.id).await.unwrap().unwrap().is_suspended());
        assert!(!repo.find_by_id(other.id).await.unwrap().unwrap().is_suspended());

        // 暂停后只有另一团队的任务可认领
        let claimed = repo.claim_one(Utc::now(), window()).await.unwrap().unwrap();
        assert_eq!(claimed.team_id, "team-2");
    }

    #[tokio::test]
    async fn test_suspend_keeps_poisoned_tasks() {
        let repo = MemoryTaskRepository::new();
        let poisoned = task("team-1", TrainingMode::Chunk);
        repo.insert_many(vec![poisoned.clone()]).await.unwrap();
        repo.mark_poisoned(poisoned.id).await.unwrap();

        assert_eq!(repo.suspend_team("team-1").await.unwrap(), 0);
        assert!(repo.find_by_id(poisoned.id).await.unwrap().unwrap().is_poisoned());
    }

    #[tokio::test]
    async fn test_resume_team_restores_only_suspended() {
        let repo = MemoryTaskRepository::new();
        let suspended = task("team-1", TrainingMode::Chunk);
        let poisoned = task("team-1", TrainingMode::Chunk);
        repo.insert_many(vec![suspended.clone(), poisoned.clone()])
            .await
            .unwrap();
        repo.suspend_team("team-1").await.unwrap();
        // 毒化覆盖暂停哨兵
        repo.mark_poisoned(poisoned.id).await.unwrap();

        assert_eq!(repo.resume_team("team-1").await.unwrap(), 1);
        let restored = repo.find_by_id(suspended.id).await.unwrap().unwrap();
        assert_eq!(restored.lease_until, unleased());
        assert!(repo.find_by_id(poisoned.id).await.unwrap().unwrap().is_poisoned());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = MemoryTaskRepository::new();
        let t = task("team-1", TrainingMode::Chunk);
        repo.insert_many(vec![t.clone()]).await.unwrap();

        assert!(repo.delete_by_id(t.id).await.unwrap());
        assert!(!repo.delete_by_id(t.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_pending_excludes_sentinels() {
        let repo = MemoryTaskRepository::new();
        let pending = task("team-1", TrainingMode::Chunk);
        let poisoned = task("team-1", TrainingMode::Chunk);
        let suspended = task("team-2", TrainingMode::Chunk);
        repo.insert_many(vec![pending, poisoned.clone(), suspended])
            .await
            .unwrap();
        repo.mark_poisoned(poisoned.id).await.unwrap();
        repo.suspend_team("team-2").await.unwrap();

        assert_eq!(repo.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_poisoned_missing_task() {
        let repo = MemoryTaskRepository::new();
        let result = repo.mark_poisoned(Uuid::new_v4()).await;
        assert!(matches!(result, Err(TrainerError::TaskNotFound { .. })));
    }
}
