//! 队列管理接口

use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    /// 待处理任务数（不含毒化与暂停）
    pub pending: u64,
    /// 本进程在途任务数
    pub in_flight: usize,
}

/// 团队充值后恢复被暂停的训练任务
pub async fn resume_training(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let resumed = state.task_repo.resume_team(&team_id).await?;
    if resumed > 0 {
        info!(team_id = %team_id, resumed, "团队训练任务已恢复，唤醒生成队列");
        state.waker.wake();
    }
    Ok(ApiResponse::success(json!({ "resumed": resumed })))
}

/// 训练队列状态
pub async fn training_status(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<TrainingStatus>> {
    let pending = state.task_repo.count_pending().await?;
    Ok(ApiResponse::success(TrainingStatus {
        pending,
        in_flight: state.waker.in_flight(),
    }))
}
