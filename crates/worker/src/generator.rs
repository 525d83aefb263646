//! 向量生成链
//!
//! 每条链循环执行"认领一个任务 -> 处理 -> 完成"，队列空时自然结束。
//! 链的重启只靠队列唤醒（入库成功、团队恢复、进程启动），没有周期轮询。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use trainer_core::{Result, TrainerError};
use trainer_domain::{
    BalanceService, BillingReporter, EmbeddingProvider, Notification, NotificationService,
    TrainingTask, TrainingTaskRepository, UsageReport, VectorRecord, VectorStore,
};

use crate::concurrency::ConcurrencyGovernor;
use crate::sanitize::strip_control_chars;

/// 单步执行结果，决定生成链的下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    /// 处理完一个任务（或已做完哨兵处置），立即认领下一个
    Continue,
    /// 队列已空，本链结束
    Idle,
    /// 瞬时失败，固定延迟后再试
    Backoff,
}

/// 向量生成器
///
/// 无内部可变状态，可被任意条链共享；任务互斥完全由
/// 仓储的原子认领保证。
pub struct VectorGenerator {
    task_repo: Arc<dyn TrainingTaskRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    balance: Arc<dyn BalanceService>,
    billing: Arc<dyn BillingReporter>,
    notifier: Arc<dyn NotificationService>,
    governor: Arc<ConcurrencyGovernor>,
    lease_window: chrono::Duration,
    retry_delay: Duration,
}

impl VectorGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn TrainingTaskRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        balance: Arc<dyn BalanceService>,
        billing: Arc<dyn BillingReporter>,
        notifier: Arc<dyn NotificationService>,
        governor: Arc<ConcurrencyGovernor>,
        lease_window: chrono::Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            task_repo,
            embedder,
            vector_store,
            balance,
            billing,
            notifier,
            governor,
            lease_window,
            retry_delay,
        }
    }

    pub fn governor(&self) -> &Arc<ConcurrencyGovernor> {
        &self.governor
    }

    /// 运行一条生成链，直到队列为空
    ///
    /// 每次迭代先申请并发槽、认领并处理一个任务、再释放槽。
    /// 退避等待发生在释放之后，等待期间不占用并发槽。
    pub async fn run_chain(&self) {
        loop {
            if !self.governor.try_admit() {
                debug!("并发槽已满，生成链退出");
                return;
            }
            let outcome = self.step_once().await;
            self.governor.release();

            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Idle => {
                    if self.governor.in_flight() == 0 {
                        info!("【向量】训练队列已清空");
                    }
                    return;
                }
                StepOutcome::Backoff => tokio::time::sleep(self.retry_delay).await,
            }
        }
    }

    /// 认领并处理一个任务
    async fn step_once(&self) -> StepOutcome {
        let task = match self.task_repo.claim_one(Utc::now(), self.lease_window).await {
            Ok(Some(task)) => task,
            Ok(None) => return StepOutcome::Idle,
            Err(e) => {
                warn!("认领训练任务失败: {e}");
                return StepOutcome::Backoff;
            }
        };
        debug!(task_id = %task.id, team_id = %task.team_id, "认领到训练任务");

        // 余额准入：每个任务处理前都检查一次
        match self.balance.check_balance(&task.team_id).await {
            Ok(()) => {}
            Err(TrainerError::InsufficientBalance { .. }) => {
                self.suspend_team(&task).await;
                return StepOutcome::Continue;
            }
            Err(e) => {
                warn!(task_id = %task.id, "余额检查失败: {e}");
                return StepOutcome::Backoff;
            }
        }

        match self.process(&task).await {
            Ok(tokens) => {
                debug!(task_id = %task.id, tokens, "任务处理完成");
                StepOutcome::Continue
            }
            Err(e) => self.dispose_failure(&task, e).await,
        }
    }

    /// 处理单个任务：清洗 -> 生成向量 -> 写入索引 -> 计费 -> 删除任务
    async fn process(&self, task: &TrainingTask) -> Result<u64> {
        let q = strip_control_chars(&task.q);
        let a = strip_control_chars(&task.a);

        let embedding = self.embedder.embed(&q, &task.model).await?;

        self.vector_store
            .upsert(VectorRecord {
                team_id: task.team_id.clone(),
                dataset_id: task.dataset_id.clone(),
                collection_id: task.collection_id.clone(),
                q,
                a,
                indexes: task.indexes.clone(),
                model: task.model.clone(),
                vector: embedding.vector,
            })
            .await?;

        self.billing
            .report_usage(UsageReport {
                team_id: task.team_id.clone(),
                tmb_id: task.tmb_id.clone(),
                tokens: embedding.tokens,
                model: task.model.clone(),
                bill_id: task.bill_id.clone(),
            })
            .await?;

        // 删除是幂等的：任务已不存在同样视为完成
        self.task_repo.delete_by_id(task.id).await?;
        Ok(embedding.tokens)
    }

    /// 失败分类
    ///
    /// 内容致命（模型明确拒绝该文本）：毒化保留，处理下一个；
    /// 其余视为瞬时失败：保持租约不动，等窗口过期后重新认领。
    async fn dispose_failure(&self, task: &TrainingTask, err: TrainerError) -> StepOutcome {
        if err.is_content_fatal() {
            warn!(task_id = %task.id, q = %task.q, "内容致命错误，任务已毒化: {err}");
            if let Err(e) = self.task_repo.mark_poisoned(task.id).await {
                error!(task_id = %task.id, "写入毒化哨兵失败: {e}");
            }
            return StepOutcome::Continue;
        }

        error!(task_id = %task.id, "向量生成失败，等待租约过期后重试: {err}");
        StepOutcome::Backoff
    }

    /// 余额不足：通知成员一次，然后暂停整个团队的任务
    async fn suspend_team(&self, task: &TrainingTask) {
        info!(team_id = %task.team_id, "团队余额不足，暂停该团队全部训练任务");

        // 通知尽力而为，失败不阻止暂停
        if let Err(e) = self
            .notifier
            .notify(Notification {
                tmb_id: task.tmb_id.clone(),
                title: "知识库训练任务中止".to_string(),
                content: "团队余额不足，知识库训练任务已中止，充值后可恢复。".to_string(),
            })
            .await
        {
            warn!(team_id = %task.team_id, "发送暂停通知失败: {e}");
        }

        match self.task_repo.suspend_team(&task.team_id).await {
            Ok(count) => info!(team_id = %task.team_id, count, "团队任务已暂停"),
            Err(e) => error!(team_id = %task.team_id, "暂停团队任务失败: {e}"),
        }
    }
}
