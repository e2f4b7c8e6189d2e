//! 提交状态 API 路由。
//!
//! 提供状态快照查询、构建触发，以及把平台通知转发到推送中心。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use buildwatch_api_types::ErrorResponse;
use buildwatch_core::{ExerciseId, ExerciseState, ParticipationId, SubmissionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use submission_tracker::TrackerError;
use tracing::warn;

use super::state::AppState;

/// 创建提交状态 API 路由。
pub fn create_tracking_router() -> Router<Arc<AppState>> {
    Router::new()
        // 练习的状态快照
        .route(
            "/api/exercises/{exercise_id}/submission-states",
            get(get_exercise_state),
        )
        // 按状态筛选参与
        .route(
            "/api/exercises/{exercise_id}/participations",
            get(list_participations),
        )
        .route("/api/result-eta", get(get_result_eta))
        .route(
            "/api/participations/{participation_id}/trigger-build",
            post(trigger_build),
        )
        .route(
            "/api/participations/{participation_id}/trigger-instructor-build",
            post(trigger_instructor_build),
        )
        .route(
            "/api/exercises/{exercise_id}/trigger-instructor-build-all",
            post(trigger_instructor_build_all),
        )
        .route(
            "/api/exercises/{exercise_id}/trigger-instructor-build",
            post(trigger_instructor_build_for),
        )
        // 平台通知转发
        .route("/api/notifications", post(publish_notification))
}

/// 练习的状态快照，练习未被订阅时为空。
async fn get_exercise_state(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<ExerciseId>,
) -> Json<ExerciseState> {
    let snapshot = state.tracker.exercise_state(exercise_id).await;
    Json(ExerciseState::clone(&snapshot))
}

#[derive(Debug, Deserialize)]
struct ParticipationQuery {
    state: SubmissionState,
}

async fn list_participations(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<ExerciseId>,
    Query(query): Query<ParticipationQuery>,
) -> Json<Vec<ParticipationId>> {
    Json(
        state
            .tracker
            .participations_in_state(exercise_id, query.state)
            .await,
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultEtaResponse {
    eta_ms: u64,
}

async fn get_result_eta(State(state): State<Arc<AppState>>) -> Json<ResultEtaResponse> {
    Json(ResultEtaResponse {
        eta_ms: state.tracker.current_eta().as_millis() as u64,
    })
}

async fn trigger_build(
    State(state): State<Arc<AppState>>,
    Path(participation_id): Path<ParticipationId>,
) -> Result<StatusCode, ApiError> {
    state.tracker.trigger_build(participation_id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn trigger_instructor_build(
    State(state): State<Arc<AppState>>,
    Path(participation_id): Path<ParticipationId>,
) -> Result<StatusCode, ApiError> {
    state
        .tracker
        .trigger_instructor_build(participation_id)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn trigger_instructor_build_all(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<ExerciseId>,
) -> Result<StatusCode, ApiError> {
    state
        .tracker
        .trigger_instructor_build_for_all_participations(exercise_id)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn trigger_instructor_build_for(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<ExerciseId>,
    Json(participation_ids): Json<Vec<ParticipationId>>,
) -> Result<StatusCode, ApiError> {
    state
        .tracker
        .trigger_instructor_build_for_participations(exercise_id, &participation_ids)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// 平台通知请求体。
#[derive(Debug, Deserialize)]
struct NotificationRequest {
    topic: String,
    payload: Value,
}

#[derive(Debug, Serialize)]
struct NotificationResponse {
    delivered: usize,
}

async fn publish_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let delivered = state
        .hub
        .publish(&request.topic, &request.payload.to_string())
        .await?;
    Ok(Json(NotificationResponse { delivered }))
}

/// API 错误类型。
#[derive(Debug)]
struct ApiError {
    message: String,
    code: String,
    status: StatusCode,
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        let (code, status) = match &err {
            TrackerError::UnknownTopic(_) => ("UNKNOWN_TOPIC", StatusCode::NOT_FOUND),
            TrackerError::Json(_) => ("INVALID_PAYLOAD", StatusCode::BAD_REQUEST),
            TrackerError::Http(_) | TrackerError::Api(_) => {
                ("UPSTREAM_ERROR", StatusCode::BAD_GATEWAY)
            }
            _ => ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
        };
        ApiError {
            message: err.to_string(),
            code: code.to_string(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(code = %self.code, message = %self.message, "api request failed");
        let body = Json(ErrorResponse {
            code: self.code,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
