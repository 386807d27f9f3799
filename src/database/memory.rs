//! In-memory [`Store`] for tests and local development.
//!
//! Tables live behind a `tokio::sync::Mutex`. A transaction takes the lock,
//! mutates a staged copy and either writes it back on commit or drops it on
//! rollback, so uncommitted rows are never visible to other callers.
//!
//! The lock is held for the whole transaction, after-mutate effect
//! included, so every other store call waits until it ends. An effect must
//! therefore not read or write through the same `MemoryStore`: that call
//! waits on the lock its own transaction holds and never returns.
//! [`PgStore`](super::PgStore) has no such restriction, since readers
//! outside a Postgres transaction see the last committed state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::{StoreError, StoreResult};
use super::store::Store;
use super::transaction::{execute_tx, no_effect, TxBackend, TxError};
use crate::error::BoxError;
use crate::models::{
    CreateUserParams, CreateUserTxParams, CreateUserTxResult, CreateVerifyEmailParams,
    UpdateUserParams, User, VerifyEmail, VerifyEmailTxParams, VerifyEmailTxResult,
    VERIFY_EMAIL_TTL_MINUTES,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<String, User>,
    verify_emails: BTreeMap<i64, VerifyEmail>,
    next_verify_email_id: i64,
}

impl Tables {
    fn insert_user(&mut self, params: CreateUserParams) -> StoreResult<User> {
        if self.users.contains_key(&params.username) {
            return Err(StoreError::unique_violation(
                Some("users_pkey"),
                format!("duplicate key value (username)=({})", params.username),
            ));
        }
        if self.users.values().any(|u| u.email == params.email) {
            return Err(StoreError::unique_violation(
                Some("users_email_key"),
                format!("duplicate key value (email)=({})", params.email),
            ));
        }

        let user = User {
            username: params.username,
            hashed_password: params.hashed_password,
            full_name: params.full_name,
            email: params.email,
            is_email_verified: false,
            password_changed_at: DateTime::<Utc>::default(),
            created_at: Utc::now(),
        };
        self.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    fn update_user(&mut self, params: UpdateUserParams) -> StoreResult<User> {
        if let Some(email) = &params.email {
            let taken = self
                .users
                .values()
                .any(|u| &u.email == email && u.username != params.username);
            if taken {
                return Err(StoreError::unique_violation(
                    Some("users_email_key"),
                    format!("duplicate key value (email)=({email})"),
                ));
            }
        }

        let user = self
            .users
            .get_mut(&params.username)
            .ok_or(StoreError::NotFound)?;
        if let Some(hashed_password) = params.hashed_password {
            user.hashed_password = hashed_password;
        }
        if let Some(changed_at) = params.password_changed_at {
            user.password_changed_at = changed_at;
        }
        if let Some(full_name) = params.full_name {
            user.full_name = full_name;
        }
        if let Some(email) = params.email {
            user.email = email;
        }
        Ok(user.clone())
    }

    fn insert_verify_email(&mut self, params: CreateVerifyEmailParams) -> StoreResult<VerifyEmail> {
        if !self.users.contains_key(&params.username) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: Some("verify_emails_username_fkey".to_string()),
                message: format!("user {} does not exist", params.username),
            });
        }

        self.next_verify_email_id += 1;
        let now = Utc::now();
        let verify_email = VerifyEmail {
            id: self.next_verify_email_id,
            username: params.username,
            email: params.email,
            secret_code: params.secret_code,
            is_used: false,
            created_at: now,
            expired_at: now + Duration::minutes(VERIFY_EMAIL_TTL_MINUTES),
        };
        self.verify_emails
            .insert(verify_email.id, verify_email.clone());
        Ok(verify_email)
    }

    fn redeem_verify_email(&mut self, params: VerifyEmailTxParams) -> StoreResult<VerifyEmailTxResult> {
        let verify_email = self
            .verify_emails
            .get_mut(&params.email_id)
            .filter(|record| record.is_redeemable(&params.secret_code, Utc::now()))
            .ok_or(StoreError::NotFound)?;
        verify_email.is_used = true;
        let verify_email = verify_email.clone();

        let user = self
            .users
            .get_mut(&verify_email.username)
            .ok_or(StoreError::NotFound)?;
        user.is_email_verified = true;

        Ok(VerifyEmailTxResult {
            user: user.clone(),
            verify_email,
        })
    }
}

/// An open in-memory transaction; holds the table lock until it ends
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed users, for assertions
    pub async fn users(&self) -> Vec<User> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Committed verify-email records, oldest first
    pub async fn verify_emails(&self) -> Vec<VerifyEmail> {
        self.tables
            .lock()
            .await
            .verify_emails
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TxBackend for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        let MemoryTx { mut guard, staged } = tx;
        *guard = staged;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user_tx(
        &self,
        params: CreateUserTxParams,
    ) -> Result<CreateUserTxResult, TxError<BoxError>> {
        let CreateUserTxParams { user, after_create } = params;
        let user = execute_tx(
            self,
            move |tx| Box::pin(async move { tx.staged.insert_user(user) }),
            after_create,
        )
        .await?;
        Ok(CreateUserTxResult { user })
    }

    async fn get_user(&self, username: &str) -> StoreResult<User> {
        self.tables
            .lock()
            .await
            .users
            .get(username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, params: UpdateUserParams) -> StoreResult<User> {
        self.tables.lock().await.update_user(params)
    }

    async fn create_verify_email(
        &self,
        params: CreateVerifyEmailParams,
    ) -> StoreResult<VerifyEmail> {
        self.tables.lock().await.insert_verify_email(params)
    }

    async fn verify_email_tx(
        &self,
        params: VerifyEmailTxParams,
    ) -> StoreResult<VerifyEmailTxResult> {
        execute_tx(
            self,
            move |tx| Box::pin(async move { tx.staged.redeem_verify_email(params) }),
            no_effect,
        )
        .await
        .map_err(TxError::into_store_error)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(username: &str, email: &str) -> CreateUserParams {
        CreateUserParams {
            username: username.to_string(),
            hashed_password: "hash".to_string(),
            full_name: "Test User".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_user_tx_commits_when_effect_succeeds() {
        let store = MemoryStore::new();
        let result = store
            .create_user_tx(CreateUserTxParams::new(
                params("alice", "alice@example.com"),
                |_| async { Ok(()) },
            ))
            .await
            .unwrap();

        assert_eq!(result.user.username, "alice");
        assert_eq!(store.get_user("alice").await.unwrap(), result.user);
    }

    #[tokio::test]
    async fn test_create_user_tx_discards_row_when_effect_fails() {
        let store = MemoryStore::new();
        let err = store
            .create_user_tx(CreateUserTxParams::new(
                params("alice", "alice@example.com"),
                |_| async { Err::<(), BoxError>("effect failed".into()) },
            ))
            .await
            .unwrap_err();

        assert!(err.is_effect_failed());
        assert_eq!(store.get_user("alice").await, Err(StoreError::NotFound));
        assert!(store.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let store = MemoryStore::new();
        store
            .create_user_tx(CreateUserTxParams::new(
                params("alice", "shared@example.com"),
                |_| async { Ok(()) },
            ))
            .await
            .unwrap();

        let err = store
            .create_user_tx(CreateUserTxParams::new(
                params("bob", "shared@example.com"),
                |_| async { Ok(()) },
            ))
            .await
            .unwrap_err();
        assert!(err.store_error().unwrap().is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_user_keeps_unset_fields() {
        let store = MemoryStore::new();
        store
            .create_user_tx(CreateUserTxParams::new(
                params("alice", "alice@example.com"),
                |_| async { Ok(()) },
            ))
            .await
            .unwrap();

        let updated = store
            .update_user(UpdateUserParams {
                username: "alice".to_string(),
                full_name: Some("Alice Liddell".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.email, "alice@example.com");

        let missing = store
            .update_user(UpdateUserParams {
                username: "nobody".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(missing, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_verify_email_tx_marks_user_verified_once() {
        let store = MemoryStore::new();
        store
            .create_user_tx(CreateUserTxParams::new(
                params("alice", "alice@example.com"),
                |_| async { Ok(()) },
            ))
            .await
            .unwrap();
        let record = store
            .create_verify_email(CreateVerifyEmailParams {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                secret_code: "code".to_string(),
            })
            .await
            .unwrap();

        let wrong = store
            .verify_email_tx(VerifyEmailTxParams {
                email_id: record.id,
                secret_code: "nope".to_string(),
            })
            .await;
        assert_eq!(wrong.unwrap_err(), StoreError::NotFound);

        let result = store
            .verify_email_tx(VerifyEmailTxParams {
                email_id: record.id,
                secret_code: "code".to_string(),
            })
            .await
            .unwrap();
        assert!(result.user.is_email_verified);
        assert!(result.verify_email.is_used);

        let again = store
            .verify_email_tx(VerifyEmailTxParams {
                email_id: record.id,
                secret_code: "code".to_string(),
            })
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_verify_email_requires_existing_user() {
        let store = MemoryStore::new();
        let err = store
            .create_verify_email(CreateVerifyEmailParams {
                username: "ghost".to_string(),
                email: "ghost@example.com".to_string(),
                secret_code: "code".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }
}
