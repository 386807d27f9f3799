use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::BoxError;
use futures::future::BoxFuture;

/// A bank customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Partial update; `None` fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUserParams {
    pub username: String,
    pub hashed_password: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Callback run with the freshly inserted user before the insert commits
pub type AfterCreateFn =
    Box<dyn FnOnce(User) -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static>;

pub struct CreateUserTxParams {
    pub user: CreateUserParams,
    pub after_create: AfterCreateFn,
}

impl CreateUserTxParams {
    pub fn new<F, Fut>(user: CreateUserParams, after_create: F) -> Self
    where
        F: FnOnce(User) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            user,
            after_create: Box::new(move |user| Box::pin(after_create(user))),
        }
    }
}

impl std::fmt::Debug for CreateUserTxParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserTxParams")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserTxResult {
    pub user: User,
}
