//! # Transactional Unit
//!
//! Couples a store mutation to a caller-supplied effect under one
//! commit/rollback decision:
//!
//! 1. `begin`
//! 2. `mutate(&mut tx)`; failure rolls back and returns [`TxError::MutationFailed`]
//! 3. `after_mutate(result)` runs **before** commit; failure rolls back and
//!    returns [`TxError::EffectFailed`] carrying the effect's error unchanged
//! 4. `commit`
//!
//! The effect is attempted at most once per call and never after a commit.
//!
//! ## Known race
//!
//! When the effect enqueues into a broker that is not part of the store
//! transaction, a commit failure after a successful enqueue leaves a task that
//! references a row that was never persisted. Task handlers treat a missing
//! row as a fatal (non-retried) failure, which bounds the damage to one
//! archived task.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

use super::error::{StoreError, StoreResult};

/// Outcome of a failed [`execute_tx`] call
#[derive(Debug, Error)]
pub enum TxError<E> {
    /// The primary mutation failed; the effect was never invoked
    #[error("mutation failed: {0}")]
    MutationFailed(StoreError),

    /// The post-mutation effect failed; the mutation was rolled back
    #[error("post-mutation effect failed: {0}")]
    EffectFailed(E),

    /// Opening or committing the transaction failed
    #[error("transaction failed: {0}")]
    Transaction(StoreError),
}

impl<E> TxError<E> {
    pub fn is_mutation_failed(&self) -> bool {
        matches!(self, Self::MutationFailed(_))
    }

    pub fn is_effect_failed(&self) -> bool {
        matches!(self, Self::EffectFailed(_))
    }

    /// The store error behind a mutation or transaction failure
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::MutationFailed(err) | Self::Transaction(err) => Some(err),
            Self::EffectFailed(_) => None,
        }
    }

    pub fn map_effect<F, E2>(self, f: F) -> TxError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::MutationFailed(err) => TxError::MutationFailed(err),
            Self::EffectFailed(err) => TxError::EffectFailed(f(err)),
            Self::Transaction(err) => TxError::Transaction(err),
        }
    }
}

impl TxError<Infallible> {
    /// Collapse a transaction without a fallible effect into its store error
    pub fn into_store_error(self) -> StoreError {
        match self {
            Self::MutationFailed(err) | Self::Transaction(err) => err,
            Self::EffectFailed(never) => match never {},
        }
    }
}

/// The transactional primitive a store backend exposes
#[async_trait]
pub trait TxBackend: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

#[async_trait]
impl TxBackend for sqlx::PgPool {
    type Tx = sqlx::Transaction<'static, sqlx::Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(sqlx::Pool::begin(self).await?)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        Ok(tx.rollback().await?)
    }
}

/// Run `mutate` and then `after_mutate` inside one transaction.
///
/// `mutate` borrows the open transaction; call sites write
/// `|tx| Box::pin(async move { ... })`. `after_mutate` receives a clone of
/// the mutation result and decides whether the transaction commits.
pub async fn execute_tx<B, T, E, M, A, Fut>(
    backend: &B,
    mutate: M,
    after_mutate: A,
) -> Result<T, TxError<E>>
where
    B: TxBackend + ?Sized,
    T: Clone + Send,
    M: for<'c> FnOnce(&'c mut B::Tx) -> BoxFuture<'c, StoreResult<T>> + Send,
    A: FnOnce(T) -> Fut + Send,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display + Send,
{
    let mut tx = backend.begin().await.map_err(TxError::Transaction)?;

    let result = match mutate(&mut tx).await {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "Mutation failed, rolling back");
            rollback_quietly(backend, tx).await;
            return Err(TxError::MutationFailed(err));
        }
    };

    if let Err(err) = after_mutate(result.clone()).await {
        warn!(error = %err, "Post-mutation effect failed, rolling back");
        rollback_quietly(backend, tx).await;
        return Err(TxError::EffectFailed(err));
    }

    backend.commit(tx).await.map_err(TxError::Transaction)?;
    Ok(result)
}

/// Rollback failures are logged and never replace the error that caused them
async fn rollback_quietly<B>(backend: &B, tx: B::Tx)
where
    B: TxBackend + ?Sized,
{
    if let Err(err) = backend.rollback(tx).await {
        warn!(error = %err, "Rollback failed");
    }
}

/// Effect for transactions that only need the mutation
pub async fn no_effect<T>(_: T) -> Result<(), Infallible> {
    Ok(())
}
