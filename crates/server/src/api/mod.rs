//! API 路由模块。
//!
//! 提供健康检查、提交状态查询与平台通知转发。

pub mod state;
pub mod tracking;

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use buildwatch_api_types::HealthCheckResponse;
use tower_http::cors::CorsLayer;

pub use state::AppState;
pub use tracking::create_tracking_router;

/// 组装 HTTP 路由。
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(create_tracking_router())
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse::ok())
}
