//! HTTP rendering of [`ApiError`].

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode as HttpStatus;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::api::{ApiError, FieldViolation, StatusCode};

pub fn http_status(code: StatusCode) -> HttpStatus {
    match code {
        StatusCode::Ok => HttpStatus::OK,
        StatusCode::InvalidArgument => HttpStatus::BAD_REQUEST,
        StatusCode::NotFound => HttpStatus::NOT_FOUND,
        StatusCode::AlreadyExists => HttpStatus::CONFLICT,
        StatusCode::Unauthenticated => HttpStatus::UNAUTHORIZED,
        StatusCode::PermissionDenied => HttpStatus::FORBIDDEN,
        StatusCode::Internal => HttpStatus::INTERNAL_SERVER_ERROR,
        StatusCode::Unimplemented => HttpStatus::NOT_IMPLEMENTED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = http_status(self.code);
        let body = json!({ "error": self });
        (status, Json(body)).into_response()
    }
}

/// Malformed JSON body
pub fn from_json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::invalid_argument(vec![FieldViolation::new("body", rejection.body_text())])
}

/// Malformed query string
pub fn from_query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::invalid_argument(vec![FieldViolation::new("query", rejection.body_text())])
}
