use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use trainer_core::TrainerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("训练队列错误: {0}")]
    Trainer(#[from] TrainerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type) = match &self {
            ApiError::Trainer(TrainerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 {id} 不存在"),
                "TASK_NOT_FOUND",
            ),
            ApiError::Trainer(TrainerError::InvalidParams(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("任务参数无效: {msg}"),
                "INVALID_PARAMS",
            ),
            ApiError::Trainer(TrainerError::InsufficientBalance { team_id }) => (
                StatusCode::PAYMENT_REQUIRED,
                format!("团队 {team_id} 余额不足"),
                "INSUFFICIENT_BALANCE",
            ),
            ApiError::Trainer(err) => {
                tracing::error!("接口内部错误: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "系统内部错误".to_string(),
                    "INTERNAL_ERROR",
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
