//! Client-visible status codes and the error carried by a failed call.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::validation::FieldViolation;
use crate::auth::AuthError;
use crate::database::{StoreError, TxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    PermissionDenied,
    Internal,
    Unimplemented,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Internal => "INTERNAL",
            Self::Unimplemented => "UNIMPLEMENTED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request as surfaced to clients of either front-end
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl ApiError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn invalid_argument(violations: Vec<FieldViolation>) -> Self {
        Self {
            code: StatusCode::InvalidArgument,
            message: "invalid parameters".to_string(),
            violations,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyExists, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PermissionDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unimplemented(method: &str) -> Self {
        Self::new(
            StatusCode::Unimplemented,
            format!("method {method} not implemented"),
        )
    }

    /// Map a store failure of `operation`; uniqueness conflicts are the
    /// client's problem, everything else is internal
    pub fn from_store(operation: &str, err: &StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. } => {
                Self::already_exists(format!("{operation}: {err}"))
            }
            StoreError::NotFound => Self::not_found(format!("{operation}: not found")),
            _ => Self::internal(format!("failed to {operation}: {err}")),
        }
    }

    /// Map a Transactional Unit failure. Effect failures are always
    /// internal, even though the mutation itself succeeded before rollback.
    pub fn from_tx<E: fmt::Display>(operation: &str, err: &TxError<E>) -> Self {
        match err {
            TxError::MutationFailed(store) => Self::from_store(operation, store),
            TxError::EffectFailed(effect) => {
                Self::internal(format!("failed to {operation}: {effect}"))
            }
            TxError::Transaction(store) => {
                Self::internal(format!("failed to {operation}: {store}"))
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Configuration(_) | AuthError::PasswordHash(_) | AuthError::Jwt(_) => {
                Self::internal(err.to_string())
            }
            _ => Self::unauthenticated(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_is_already_exists() {
        let err: TxError<String> =
            TxError::MutationFailed(StoreError::unique_violation(Some("users_pkey"), "dup"));
        assert_eq!(ApiError::from_tx("create user", &err).code, StatusCode::AlreadyExists);
    }

    #[test]
    fn test_effect_failure_is_internal() {
        let err: TxError<String> = TxError::EffectFailed("broker down".to_string());
        let api = ApiError::from_tx("create user", &err);
        assert_eq!(api.code, StatusCode::Internal);
        assert!(api.message.contains("broker down"));
    }

    #[test]
    fn test_auth_errors_are_unauthenticated() {
        assert_eq!(
            ApiError::from(AuthError::ExpiredToken).code,
            StatusCode::Unauthenticated
        );
        assert_eq!(
            ApiError::from(AuthError::Configuration("key".into())).code,
            StatusCode::Internal
        );
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(ApiError::not_found("user")).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json.get("violations").is_none());
    }
}
