//! 数据入库接口
//!
//! 校验批次、批内去重、写入训练任务，成功后唤醒生成队列。
//! 被拒绝的记录原样返回给调用方，调用方可修正后重新提交。

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use trainer_domain::entities::unleased;
use trainer_domain::{classify_batch, RawChunk, TrainingMode, TrainingTask};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDataRequest {
    pub team_id: String,
    pub tmb_id: String,
    pub dataset_id: String,
    pub collection_id: String,
    /// 训练模式："chunk" 或 "qa"
    pub mode: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub bill_id: Option<String>,
    pub data: Vec<RawChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDataResponse {
    /// 成功入队的条数
    pub inserted: usize,
    /// 超token上限被拒绝的记录
    pub over_token: Vec<RawChunk>,
    /// 批内重复被拒绝的记录
    pub repeat: Vec<RawChunk>,
    /// 缺失必填字段被拒绝的记录
    pub error: Vec<RawChunk>,
}

pub async fn push_data(
    State(state): State<AppState>,
    Json(request): Json<PushDataRequest>,
) -> ApiResult<ApiResponse<PushDataResponse>> {
    let mode = TrainingMode::parse(&request.mode)
        .ok_or_else(|| ApiError::BadRequest(format!("未知的训练模式: {}", request.mode)))?;

    if request.team_id.is_empty() || request.tmb_id.is_empty() {
        return Err(ApiError::BadRequest("teamId 和 tmbId 不能为空".to_string()));
    }
    if request.data.is_empty() {
        return Err(ApiError::BadRequest("data 不能为空".to_string()));
    }
    let max_batch = state.config.intake.max_batch_size;
    if request.data.len() > max_batch {
        return Err(ApiError::BadRequest(format!(
            "单次最多提交 {max_batch} 条数据"
        )));
    }

    let token_ceiling = match mode {
        TrainingMode::Chunk => state.config.embedding.chunk_token_ceiling(),
        TrainingMode::Qa => state.config.embedding.qa_token_ceiling(),
    };
    let classified = classify_batch(request.data, token_ceiling);

    let now = Utc::now();
    let tasks: Vec<TrainingTask> = classified
        .accepted
        .into_iter()
        .map(|chunk| TrainingTask {
            id: Uuid::new_v4(),
            team_id: request.team_id.clone(),
            tmb_id: request.tmb_id.clone(),
            dataset_id: request.dataset_id.clone(),
            collection_id: request.collection_id.clone(),
            mode,
            prompt: request.prompt.clone(),
            model: state.config.embedding.model.clone(),
            q: chunk.q,
            a: chunk.a,
            indexes: chunk.indexes,
            lease_until: unleased(),
            bill_id: request.bill_id.clone(),
            created_at: now,
        })
        .collect();

    let inserted = if tasks.is_empty() {
        0
    } else {
        state.task_repo.insert_many(tasks).await?
    };

    if inserted > 0 {
        info!(
            team_id = %request.team_id,
            collection_id = %request.collection_id,
            inserted,
            "训练数据已入队，唤醒生成队列"
        );
        state.waker.wake();
    }

    Ok(ApiResponse::success(PushDataResponse {
        inserted,
        over_token: classified.over_token,
        repeat: classified.repeat,
        error: classified.malformed,
    }))
}
