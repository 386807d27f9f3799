//! # Gateway Handlers
//!
//! Thin JSON translations onto [`BankService`](crate::api::BankService).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use tracing::debug;

use super::errors::{from_json_rejection, from_query_rejection};
use super::AppState;
use crate::api::{
    ApiError, ApiResult, CreateUserRequest, CreateUserResponse, LoginUserRequest,
    LoginUserResponse, UpdateUserRequest, UpdateUserResponse, VerifyEmailRequest,
    VerifyEmailResponse,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.service.health().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `POST /v1/create_user`
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<Json<CreateUserResponse>> {
    let Json(req) = body.map_err(from_json_rejection)?;
    state.service.create_user(req).await.map(Json)
}

/// `POST /v1/login_user`
pub async fn login_user(
    State(state): State<AppState>,
    body: Result<Json<LoginUserRequest>, JsonRejection>,
) -> ApiResult<Json<LoginUserResponse>> {
    let Json(req) = body.map_err(from_json_rejection)?;
    state.service.login_user(req).await.map(Json)
}

/// `PATCH /v1/update_user`
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateUserResponse>> {
    let Json(req) = body.map_err(from_json_rejection)?;
    let authorization = headers
        .get(AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::unauthenticated("Invalid authorization header format"))
        })
        .transpose()?;
    debug!(username = %req.username, "GATEWAY: update_user");
    state.service.update_user(authorization, req).await.map(Json)
}

/// `GET /v1/verify_email?email_id=..&secret_code=..`
pub async fn verify_email(
    State(state): State<AppState>,
    query: Result<Query<VerifyEmailRequest>, QueryRejection>,
) -> ApiResult<Json<VerifyEmailResponse>> {
    let Query(req) = query.map_err(from_query_rejection)?;
    state.service.verify_email(req).await.map(Json)
}

/// Unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}
