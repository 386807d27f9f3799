//! The store abstraction request handlers and task handlers depend on.

use async_trait::async_trait;

use super::error::StoreResult;
use super::transaction::TxError;
use crate::error::BoxError;
use crate::models::{
    CreateUserTxParams, CreateUserTxResult, CreateVerifyEmailParams, UpdateUserParams, User,
    VerifyEmail, VerifyEmailTxParams, VerifyEmailTxResult,
};

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Insert a user and run `params.after_create` before committing.
    async fn create_user_tx(
        &self,
        params: CreateUserTxParams,
    ) -> Result<CreateUserTxResult, TxError<BoxError>>;

    async fn get_user(&self, username: &str) -> StoreResult<User>;

    async fn update_user(&self, params: UpdateUserParams) -> StoreResult<User>;

    async fn create_verify_email(&self, params: CreateVerifyEmailParams)
        -> StoreResult<VerifyEmail>;

    /// Redeem a verification code and mark the owner's email verified.
    async fn verify_email_tx(&self, params: VerifyEmailTxParams)
        -> StoreResult<VerifyEmailTxResult>;

    /// Cheap liveness check for `/health`
    async fn health_check(&self) -> StoreResult<()>;
}
