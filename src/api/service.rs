//! # Bank Service
//!
//! Request handlers shared by the RPC endpoint and the HTTP gateway. Each
//! handler validates its request, talks to the [`Store`] and maps failures
//! onto [`ApiError`] once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::status::{ApiError, ApiResult};
use super::validation::{
    validate_email, validate_email_id, validate_full_name, validate_password,
    validate_secret_code, validate_username, Violations,
};
use crate::auth::{check_password, extract_bearer_token, hash_password, AuthError, TokenMaker};
use crate::config::AuthConfig;
use crate::database::{Store, StoreError};
use crate::error::BoxError;
use crate::models::{
    CreateUserParams, CreateUserTxParams, UpdateUserParams, User, VerifyEmailTxParams,
};
use crate::worker::{PayloadSendVerifyEmail, TaskDistributor, TaskOptions, TaskQueue};

/// Retries granted to the verification email task
pub const VERIFY_EMAIL_MAX_RETRIES: u32 = 10;
/// Delay before the verification email task becomes visible to workers
pub const VERIFY_EMAIL_PROCESS_IN: Duration = Duration::from_secs(10);

/// A user as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            is_email_verified: user.is_email_verified,
            password_changed_at: user.password_changed_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub user: UserView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUserResponse {
    pub user: UserView,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserResponse {
    pub user: UserView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailResponse {
    pub is_verified: bool,
}

pub struct BankService {
    store: Arc<dyn Store>,
    distributor: Arc<dyn TaskDistributor>,
    token_maker: TokenMaker,
    access_token_duration: Duration,
}

impl BankService {
    pub fn new(
        auth: &AuthConfig,
        store: Arc<dyn Store>,
        distributor: Arc<dyn TaskDistributor>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            store,
            distributor,
            token_maker: TokenMaker::from_config(auth)?,
            access_token_duration: auth.access_token_duration(),
        })
    }

    pub fn token_maker(&self) -> &TokenMaker {
        &self.token_maker
    }

    /// Register a user and enqueue the verification email inside the same
    /// transaction. If the enqueue fails the user row is rolled back.
    pub async fn create_user(&self, req: CreateUserRequest) -> ApiResult<CreateUserResponse> {
        let mut violations = Violations::new();
        violations
            .check("username", validate_username(&req.username))
            .check("password", validate_password(&req.password))
            .check("full_name", validate_full_name(&req.full_name))
            .check("email", validate_email(&req.email));
        violations.into_result().map_err(ApiError::invalid_argument)?;

        let hashed_password = hash_password(&req.password)?;

        let distributor = self.distributor.clone();
        let params = CreateUserTxParams::new(
            CreateUserParams {
                username: req.username,
                hashed_password,
                full_name: req.full_name,
                email: req.email,
            },
            move |user: User| async move {
                let payload = PayloadSendVerifyEmail {
                    username: user.username,
                };
                let options = TaskOptions::new()
                    .max_retries(VERIFY_EMAIL_MAX_RETRIES)
                    .process_in(VERIFY_EMAIL_PROCESS_IN)
                    .queue(TaskQueue::Critical);
                distributor
                    .distribute_task_send_verify_email(&payload, options)
                    .await
                    .map(|_| ())
                    .map_err(|e| Box::new(e) as BoxError)
            },
        );

        let result = self
            .store
            .create_user_tx(params)
            .await
            .map_err(|e| ApiError::from_tx("create user", &e))?;

        info!(username = %result.user.username, "👤 API: User created");
        Ok(CreateUserResponse {
            user: result.user.into(),
        })
    }

    pub async fn login_user(&self, req: LoginUserRequest) -> ApiResult<LoginUserResponse> {
        let mut violations = Violations::new();
        violations
            .check("username", validate_username(&req.username))
            .check("password", validate_password(&req.password));
        violations.into_result().map_err(ApiError::invalid_argument)?;

        let user = self.store.get_user(&req.username).await.map_err(|e| match e {
            StoreError::NotFound => ApiError::not_found("user not found"),
            other => ApiError::from_store("find user", &other),
        })?;

        check_password(&req.password, &user.hashed_password).map_err(|e| match e {
            AuthError::PasswordMismatch => ApiError::unauthenticated("incorrect password"),
            other => other.into(),
        })?;

        let (access_token, claims) = self
            .token_maker
            .create_token(&user.username, self.access_token_duration)?;
        let access_token_expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| ApiError::internal("token expiry out of range"))?;

        debug!(username = %user.username, "API: User logged in");
        Ok(LoginUserResponse {
            user: user.into(),
            access_token,
            access_token_expires_at,
        })
    }

    /// `authorization` is the raw `Authorization` header value
    pub async fn update_user(
        &self,
        authorization: Option<&str>,
        req: UpdateUserRequest,
    ) -> ApiResult<UpdateUserResponse> {
        let header = authorization.ok_or(AuthError::MissingAuthHeader)?;
        let claims = self
            .token_maker
            .verify_token(extract_bearer_token(header)?)?;

        let mut violations = Violations::new();
        violations.check("username", validate_username(&req.username));
        if let Some(password) = &req.password {
            violations.check("password", validate_password(password));
        }
        if let Some(full_name) = &req.full_name {
            violations.check("full_name", validate_full_name(full_name));
        }
        if let Some(email) = &req.email {
            violations.check("email", validate_email(email));
        }
        violations.into_result().map_err(ApiError::invalid_argument)?;

        if claims.username() != req.username {
            return Err(ApiError::permission_denied(
                "cannot update other user's info",
            ));
        }

        let (hashed_password, password_changed_at) = match &req.password {
            Some(password) => (Some(hash_password(password)?), Some(Utc::now())),
            None => (None, None),
        };

        let user = self
            .store
            .update_user(UpdateUserParams {
                username: req.username,
                hashed_password,
                password_changed_at,
                full_name: req.full_name,
                email: req.email,
            })
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ApiError::not_found("user not found"),
                other => ApiError::from_store("update user", &other),
            })?;

        Ok(UpdateUserResponse { user: user.into() })
    }

    pub async fn verify_email(&self, req: VerifyEmailRequest) -> ApiResult<VerifyEmailResponse> {
        let mut violations = Violations::new();
        violations
            .check("email_id", validate_email_id(req.email_id))
            .check("secret_code", validate_secret_code(&req.secret_code));
        violations.into_result().map_err(ApiError::invalid_argument)?;

        let result = self
            .store
            .verify_email_tx(VerifyEmailTxParams {
                email_id: req.email_id,
                secret_code: req.secret_code,
            })
            .await
            .map_err(|e| match e {
                StoreError::NotFound => {
                    ApiError::not_found("verification code is invalid, used or expired")
                }
                other => ApiError::from_store("verify email", &other),
            })?;

        info!(username = %result.user.username, "✅ API: Email verified");
        Ok(VerifyEmailResponse {
            is_verified: result.user.is_email_verified,
        })
    }

    /// Store liveness, reported by `/health`
    pub async fn health(&self) -> bool {
        self.store.health_check().await.is_ok()
    }
}
