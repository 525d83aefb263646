//! 向量生成链的行为测试
//!
//! 协作方用mock，任务仓储与向量索引用内存实现。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mockall::mock;
use uuid::Uuid;

use trainer_core::{EmbeddingError, Result, TrainerError};
use trainer_domain::entities::unleased;
use trainer_domain::{
    BalanceService, BillingReporter, Embedding, EmbeddingProvider, Notification,
    NotificationService, TrainingMode, TrainingTask, TrainingTaskRepository, UsageReport,
};
use trainer_infrastructure::{MemoryTaskRepository, MemoryVectorStore};
use trainer_worker::{ConcurrencyGovernor, VectorGenerator};

mock! {
    Embedder {}

    #[async_trait::async_trait]
    impl EmbeddingProvider for Embedder {
        async fn embed(&self, text: &str, model: &str) -> Result<Embedding>;
    }
}

mock! {
    Balance {}

    #[async_trait::async_trait]
    impl BalanceService for Balance {
        async fn check_balance(&self, team_id: &str) -> Result<()>;
    }
}

mock! {
    Billing {}

    #[async_trait::async_trait]
    impl BillingReporter for Billing {
        async fn report_usage(&self, report: UsageReport) -> Result<()>;
    }
}

mock! {
    Notifier {}

    #[async_trait::async_trait]
    impl NotificationService for Notifier {
        async fn notify(&self, notification: Notification) -> Result<()>;
    }
}

fn chunk_task(team_id: &str, q: &str) -> TrainingTask {
    TrainingTask {
        id: Uuid::new_v4(),
        team_id: team_id.to_string(),
        tmb_id: format!("{team_id}-member"),
        dataset_id: "ds-1".to_string(),
        collection_id: "col-1".to_string(),
        mode: TrainingMode::Chunk,
        prompt: None,
        model: "text-embedding-ada-002".to_string(),
        q: q.to_string(),
        a: String::new(),
        indexes: vec![],
        lease_until: unleased(),
        bill_id: Some("bill-1".to_string()),
        created_at: Utc::now(),
    }
}

fn balance_always_ok() -> MockBalance {
    let mut balance = MockBalance::new();
    balance.expect_check_balance().returning(|_| Ok(()));
    balance
}

struct Harness {
    repo: Arc<MemoryTaskRepository>,
    store: Arc<MemoryVectorStore>,
    governor: Arc<ConcurrencyGovernor>,
    generator: VectorGenerator,
}

fn harness(
    embedder: MockEmbedder,
    balance: MockBalance,
    billing: MockBilling,
    notifier: MockNotifier,
) -> Harness {
    let repo = Arc::new(MemoryTaskRepository::new());
    let store = Arc::new(MemoryVectorStore::new());
    let governor = Arc::new(ConcurrencyGovernor::new(2));
    let generator = VectorGenerator::new(
        Arc::clone(&repo) as Arc<dyn TrainingTaskRepository>,
        Arc::new(embedder),
        Arc::clone(&store) as Arc<dyn trainer_domain::VectorStore>,
        Arc::new(balance),
        Arc::new(billing),
        Arc::new(notifier),
        Arc::clone(&governor),
        chrono::Duration::seconds(60),
        Duration::from_millis(5),
    );
    Harness {
        repo,
        store,
        governor,
        generator,
    }
}

#[tokio::test]
async fn test_success_path_deletes_task_and_reports_billing() {
    let mut embedder = MockEmbedder::new();
    embedder
        .expect_embed()
        .times(1)
        .returning(|_, _| Ok(Embedding { vector: vec![0.1, 0.2, 0.3], tokens: 20 }));

    let mut billing = MockBilling::new();
    billing
        .expect_report_usage()
        .withf(|report| report.tokens == 20 && report.bill_id.as_deref() == Some("bill-1"))
        .times(1)
        .returning(|_| Ok(()));

    let h = harness(embedder, balance_always_ok(), billing, MockNotifier::new());
    let task = chunk_task("team-1", "什么是向量检索");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    h.generator.run_chain().await;

    assert!(h.repo.find_by_id(task.id).await.unwrap().is_none(), "完成的任务应被删除");
    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].q, "什么是向量检索");
    assert_eq!(h.governor.in_flight(), 0);
}

#[tokio::test]
async fn test_control_chars_are_stripped_before_embedding() {
    let mut embedder = MockEmbedder::new();
    embedder
        .expect_embed()
        .withf(|text, _| text == "有效 文本")
        .times(1)
        .returning(|_, _| Ok(Embedding { vector: vec![0.5], tokens: 3 }));

    let mut billing = MockBilling::new();
    billing.expect_report_usage().returning(|_| Ok(()));

    let h = harness(embedder, balance_always_ok(), billing, MockNotifier::new());
    h.repo
        .insert_many(vec![chunk_task("team-1", "有效\u{0000}文本")])
        .await
        .unwrap();

    h.generator.run_chain().await;

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].q, "有效 文本");
}

#[tokio::test]
async fn test_rate_limited_task_is_kept_for_lease_retry() {
    let mut embedder = MockEmbedder::new();
    embedder
        .expect_embed()
        .times(1)
        .returning(|_, _| Err(EmbeddingError::RateLimited.into()));

    let h = harness(
        embedder,
        balance_always_ok(),
        MockBilling::new(),
        MockNotifier::new(),
    );
    let task = chunk_task("team-1", "限流的任务");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    h.generator.run_chain().await;

    // 任务保留且带着认领时刻的租约，等窗口过期后重新认领
    let kept = h.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert!(!kept.is_poisoned());
    assert!(!kept.is_suspended());
    assert!(kept.lease_until > unleased());
    assert!(h.store.records().is_empty());
    assert_eq!(h.governor.in_flight(), 0, "退避期间不应占用并发槽");
}

#[tokio::test]
async fn test_invalid_request_poisons_task_and_chain_continues() {
    let mut embedder = MockEmbedder::new();
    embedder.expect_embed().times(2).returning(|text, _| {
        if text == "坏内容" {
            Err(EmbeddingError::InvalidRequest {
                status: 400,
                message: "invalid input".to_string(),
            }
            .into())
        } else {
            Ok(Embedding { vector: vec![0.1], tokens: 5 })
        }
    });

    let mut billing = MockBilling::new();
    billing.expect_report_usage().times(1).returning(|_| Ok(()));

    let h = harness(embedder, balance_always_ok(), billing, MockNotifier::new());
    let bad = chunk_task("team-1", "坏内容");
    let good = chunk_task("team-1", "正常内容");
    h.repo
        .insert_many(vec![bad.clone(), good.clone()])
        .await
        .unwrap();

    h.generator.run_chain().await;

    // 毒化任务保留待排查，正常任务照常完成
    let poisoned = h.repo.find_by_id(bad.id).await.unwrap().unwrap();
    assert!(poisoned.is_poisoned());
    assert!(h.repo.find_by_id(good.id).await.unwrap().is_none());
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test]
async fn test_poisoned_task_is_never_reclaimed() {
    let mut embedder = MockEmbedder::new();
    embedder.expect_embed().times(1).returning(|_, _| {
        Err(EmbeddingError::InvalidRequest {
            status: 422,
            message: "unprocessable".to_string(),
        }
        .into())
    });

    let h = harness(
        embedder,
        balance_always_ok(),
        MockBilling::new(),
        MockNotifier::new(),
    );
    let task = chunk_task("team-1", "坏内容");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    h.generator.run_chain().await;
    // 再次唤醒也不会碰毒化任务（embed限定只调用1次）
    h.generator.run_chain().await;

    assert!(h.repo.find_by_id(task.id).await.unwrap().unwrap().is_poisoned());
}

#[tokio::test]
async fn test_insufficient_balance_suspends_whole_team_and_notifies_once() {
    let embedder = MockEmbedder::new();

    let mut balance = MockBalance::new();
    balance
        .expect_check_balance()
        .times(1)
        .returning(|team_id| {
            Err(TrainerError::InsufficientBalance {
                team_id: team_id.to_string(),
            })
        });

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|n| n.tmb_id == "team-1-member")
        .times(1)
        .returning(|_| Ok(()));

    let h = harness(embedder, balance, MockBilling::new(), notifier);
    let t1 = chunk_task("team-1", "任务一");
    let t2 = chunk_task("team-1", "任务二");
    h.repo.insert_many(vec![t1.clone(), t2.clone()]).await.unwrap();

    h.generator.run_chain().await;

    assert!(h.repo.find_by_id(t1.id).await.unwrap().unwrap().is_suspended());
    assert!(h.repo.find_by_id(t2.id).await.unwrap().unwrap().is_suspended());
    assert!(h.store.records().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_block_suspension() {
    let mut balance = MockBalance::new();
    balance.expect_check_balance().times(1).returning(|team_id| {
        Err(TrainerError::InsufficientBalance {
            team_id: team_id.to_string(),
        })
    });

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .times(1)
        .returning(|_| Err(TrainerError::Notification("服务超时".to_string())));

    let h = harness(MockEmbedder::new(), balance, MockBilling::new(), notifier);
    let task = chunk_task("team-1", "任务");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    h.generator.run_chain().await;

    assert!(h.repo.find_by_id(task.id).await.unwrap().unwrap().is_suspended());
}

#[tokio::test]
async fn test_chain_exits_when_no_slot_available() {
    let h = harness(
        MockEmbedder::new(),
        MockBalance::new(),
        MockBilling::new(),
        MockNotifier::new(),
    );
    let task = chunk_task("team-1", "任务");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    // 占满并发槽后，新链不认领任何任务直接退出
    assert!(h.governor.try_admit());
    assert!(h.governor.try_admit());
    h.generator.run_chain().await;

    let untouched = h.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(untouched.lease_until, unleased());
}

#[tokio::test]
async fn test_billing_failure_leaves_task_for_retry() {
    let mut embedder = MockEmbedder::new();
    embedder
        .expect_embed()
        .times(1)
        .returning(|_, _| Ok(Embedding { vector: vec![0.1], tokens: 7 }));

    let mut billing = MockBilling::new();
    billing
        .expect_report_usage()
        .times(1)
        .returning(|_| Err(TrainerError::Billing("账户服务不可用".to_string())));

    let h = harness(embedder, balance_always_ok(), billing, MockNotifier::new());
    let task = chunk_task("team-1", "任务");
    h.repo.insert_many(vec![task.clone()]).await.unwrap();

    h.generator.run_chain().await;

    // 计费失败按瞬时错误处理，任务保留
    let kept = h.repo.find_by_id(task.id).await.unwrap().unwrap();
    assert!(!kept.is_poisoned());
}
