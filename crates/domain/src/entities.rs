use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 训练模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrainingMode {
    /// 直接向量化文本块
    #[serde(rename = "chunk")]
    Chunk,
    /// 先经QA拆分再向量化
    #[serde(rename = "qa")]
    Qa,
}

impl TrainingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingMode::Chunk => "chunk",
            TrainingMode::Qa => "qa",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chunk" => Some(TrainingMode::Chunk),
            "qa" => Some(TrainingMode::Qa),
            _ => None,
        }
    }
}

/// 检索索引提示，随任务透传到向量索引
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexHint {
    /// 索引类型，如 "default"、"custom"
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// 提交的原始记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawChunk {
    pub q: String,
    #[serde(default)]
    pub a: String,
    #[serde(default)]
    pub indexes: Vec<IndexHint>,
}

impl RawChunk {
    /// 批内去重键：问题与答案的拼接
    pub fn dedup_key(&self) -> String {
        format!("{}{}", self.q, self.a)
    }
}

/// 训练任务：一条待向量化的文本记录
///
/// `lease_until` 同时承担三种语义：
/// - 过去的时间戳表示未被认领或租约已过期，任务可被认领；
/// - 刚被认领的任务 `lease_until` 为认领时刻；
/// - 远未来的哨兵值表示毒化（2998年）或余额暂停（2999年）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingTask {
    pub id: Uuid,
    pub team_id: String,
    pub tmb_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    pub mode: TrainingMode,
    pub prompt: Option<String>,
    /// 该任务使用的向量模型名称
    pub model: String,
    pub q: String,
    pub a: String,
    pub indexes: Vec<IndexHint>,
    pub lease_until: DateTime<Utc>,
    pub bill_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 毒化哨兵：内容致命错误，任务保留待人工排查
pub fn poison_sentinel() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2998, 5, 5, 0, 0, 0).unwrap()
}

/// 暂停哨兵：团队余额不足，充值后可恢复
pub fn suspend_sentinel() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2999, 5, 5, 0, 0, 0).unwrap()
}

/// 新任务的初始租约：远过去时间，立即可被认领
pub fn unleased() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

impl TrainingTask {
    pub fn is_poisoned(&self) -> bool {
        self.lease_until == poison_sentinel()
    }

    pub fn is_suspended(&self) -> bool {
        self.lease_until == suspend_sentinel()
    }

    /// 任务是否可被认领：chunk模式且租约早于 now - lease_window
    pub fn is_claimable(&self, now: DateTime<Utc>, lease_window: chrono::Duration) -> bool {
        self.mode == TrainingMode::Chunk && self.lease_until <= now - lease_window
    }
}

/// 向量模型的返回结果
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// 本次调用消耗的token数，用于计费
    pub tokens: u64,
}

/// 计费用量事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageReport {
    pub team_id: String,
    pub tmb_id: String,
    pub tokens: u64,
    pub model: String,
    pub bill_id: Option<String>,
}

/// 站内通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub tmb_id: String,
    pub title: String,
    pub content: String,
}

/// 写入检索索引的向量记录
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub team_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    pub q: String,
    pub a: String,
    pub indexes: Vec<IndexHint>,
    pub model: String,
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(mode: TrainingMode, lease_until: DateTime<Utc>) -> TrainingTask {
        TrainingTask {
            id: Uuid::new_v4(),
            team_id: "team-1".to_string(),
            tmb_id: "tmb-1".to_string(),
            dataset_id: "ds-1".to_string(),
            collection_id: "col-1".to_string(),
            mode,
            prompt: None,
            model: "text-embedding-ada-002".to_string(),
            q: "什么是向量检索".to_string(),
            a: String::new(),
            indexes: vec![],
            lease_until,
            bill_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sentinels_are_distinguishable() {
        assert_ne!(poison_sentinel(), suspend_sentinel());
        let poisoned = sample_task(TrainingMode::Chunk, poison_sentinel());
        assert!(poisoned.is_poisoned());
        assert!(!poisoned.is_suspended());

        let suspended = sample_task(TrainingMode::Chunk, suspend_sentinel());
        assert!(suspended.is_suspended());
        assert!(!suspended.is_poisoned());
    }

    #[test]
    fn test_unleased_task_is_claimable() {
        let task = sample_task(TrainingMode::Chunk, unleased());
        assert!(task.is_claimable(Utc::now(), chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_freshly_leased_task_is_not_claimable() {
        let now = Utc::now();
        let task = sample_task(TrainingMode::Chunk, now);
        assert!(!task.is_claimable(now, chrono::Duration::seconds(60)));
        // 租约窗口过后重新可认领
        let later = now + chrono::Duration::seconds(61);
        assert!(task.is_claimable(later, chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_qa_task_is_never_claimable_by_vector_worker() {
        let task = sample_task(TrainingMode::Qa, unleased());
        assert!(!task.is_claimable(Utc::now(), chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_sentinel_tasks_are_not_claimable() {
        let now = Utc::now();
        let window = chrono::Duration::seconds(60);
        assert!(!sample_task(TrainingMode::Chunk, poison_sentinel()).is_claimable(now, window));
        assert!(!sample_task(TrainingMode::Chunk, suspend_sentinel()).is_claimable(now, window));
    }

    #[test]
    fn test_dedup_key_concatenates_q_and_a() {
        let chunk = RawChunk {
            q: "问".to_string(),
            a: "答".to_string(),
            indexes: vec![],
        };
        assert_eq!(chunk.dedup_key(), "问答");
    }
}
