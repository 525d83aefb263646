use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use trainer_core::AppConfig;
use trainer_domain::{QueueWaker, TrainingTaskRepository};

use crate::handlers::{
    health::health_check,
    push_data::push_data,
    queue::{resume_training, training_status},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub task_repo: Arc<dyn TrainingTaskRepository>,
    pub waker: Arc<dyn QueueWaker>,
    pub config: Arc<AppConfig>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 数据入库
        .route("/api/dataset/data/push", post(push_data))
        // 队列管理
        .route(
            "/api/dataset/training/resume/{team_id}",
            post(resume_training),
        )
        .route("/api/dataset/training/status", get(training_status))
        .with_state(state)
}
