//! HTTP接口层
//!
//! 数据入库、队列管理与健康检查的REST接口

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};
