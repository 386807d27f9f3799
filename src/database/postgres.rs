//! Postgres-backed [`Store`].

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use super::error::StoreResult;
use super::store::Store;
use super::transaction::{execute_tx, no_effect, TxError};
use crate::error::BoxError;
use crate::models::{
    CreateUserParams, CreateUserTxParams, CreateUserTxResult, CreateVerifyEmailParams,
    UpdateUserParams, User, VerifyEmail, VerifyEmailTxParams, VerifyEmailTxResult,
};

const CREATE_USER_SQL: &str = r#"
    INSERT INTO users (username, hashed_password, full_name, email)
    VALUES ($1, $2, $3, $4)
    RETURNING *
"#;

const GET_USER_SQL: &str = "SELECT * FROM users WHERE username = $1 LIMIT 1";

const UPDATE_USER_SQL: &str = r#"
    UPDATE users
    SET
        hashed_password = COALESCE($1, hashed_password),
        password_changed_at = COALESCE($2, password_changed_at),
        full_name = COALESCE($3, full_name),
        email = COALESCE($4, email)
    WHERE username = $5
    RETURNING *
"#;

const CREATE_VERIFY_EMAIL_SQL: &str = r#"
    INSERT INTO verify_emails (username, email, secret_code)
    VALUES ($1, $2, $3)
    RETURNING *
"#;

const REDEEM_VERIFY_EMAIL_SQL: &str = r#"
    UPDATE verify_emails
    SET is_used = TRUE
    WHERE id = $1
        AND secret_code = $2
        AND is_used = FALSE
        AND expired_at > now()
    RETURNING *
"#;

const MARK_EMAIL_VERIFIED_SQL: &str = r#"
    UPDATE users
    SET is_email_verified = TRUE
    WHERE username = $1
    RETURNING *
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_user(conn: &mut PgConnection, params: CreateUserParams) -> StoreResult<User> {
    let user = sqlx::query_as::<_, User>(CREATE_USER_SQL)
        .bind(&params.username)
        .bind(&params.hashed_password)
        .bind(&params.full_name)
        .bind(&params.email)
        .fetch_one(conn)
        .await?;
    Ok(user)
}

async fn redeem_verify_email(
    conn: &mut PgConnection,
    params: VerifyEmailTxParams,
) -> StoreResult<VerifyEmailTxResult> {
    let verify_email = sqlx::query_as::<_, VerifyEmail>(REDEEM_VERIFY_EMAIL_SQL)
        .bind(params.email_id)
        .bind(&params.secret_code)
        .fetch_one(&mut *conn)
        .await?;

    let user = sqlx::query_as::<_, User>(MARK_EMAIL_VERIFIED_SQL)
        .bind(&verify_email.username)
        .fetch_one(&mut *conn)
        .await?;

    Ok(VerifyEmailTxResult { user, verify_email })
}

#[async_trait]
impl Store for PgStore {
    async fn create_user_tx(
        &self,
        params: CreateUserTxParams,
    ) -> Result<CreateUserTxResult, TxError<BoxError>> {
        let CreateUserTxParams { user, after_create } = params;
        debug!(username = %user.username, "Creating user in transaction");

        let user = execute_tx(
            &self.pool,
            move |tx| Box::pin(insert_user(&mut **tx, user)),
            after_create,
        )
        .await?;

        Ok(CreateUserTxResult { user })
    }

    async fn get_user(&self, username: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(GET_USER_SQL)
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user(&self, params: UpdateUserParams) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(UPDATE_USER_SQL)
            .bind(params.hashed_password)
            .bind(params.password_changed_at)
            .bind(params.full_name)
            .bind(params.email)
            .bind(&params.username)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_verify_email(
        &self,
        params: CreateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        let verify_email = sqlx::query_as::<_, VerifyEmail>(CREATE_VERIFY_EMAIL_SQL)
            .bind(&params.username)
            .bind(&params.email)
            .bind(&params.secret_code)
            .fetch_one(&self.pool)
            .await?;
        Ok(verify_email)
    }

    async fn verify_email_tx(
        &self,
        params: VerifyEmailTxParams,
    ) -> StoreResult<VerifyEmailTxResult> {
        execute_tx(
            &self.pool,
            move |tx| Box::pin(redeem_verify_email(&mut **tx, params)),
            no_effect,
        )
        .await
        .map_err(TxError::into_store_error)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
