//! # Create-User Transaction Tests
//!
//! A user row and its send-verify-email task either both exist or neither
//! does.

mod common;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{create_user_request, test_config, TestBackends};
use simplebank::api::{BankService, StatusCode};
use simplebank::database::{Store, TxError};
use simplebank::error::BoxError;
use simplebank::messaging::{MessageId, MessagingError};
use simplebank::models::{CreateUserParams, CreateUserTxParams, User};
use simplebank::worker::{DistributorError, Task, TaskDistributor, TASK_SEND_VERIFY_EMAIL};

/// Distributor whose broker is always unreachable; counts attempts
#[derive(Default)]
struct FailingDistributor {
    attempts: AtomicUsize,
}

#[async_trait]
impl TaskDistributor for FailingDistributor {
    async fn distribute_task(&self, task: Task) -> Result<MessageId, DistributorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DistributorError::enqueue_failed(
            task.task_type(),
            task.options().queue.clone(),
            MessagingError::unavailable("connection refused"),
        ))
    }
}

fn user_params(username: &str) -> CreateUserParams {
    CreateUserParams {
        username: username.to_string(),
        hashed_password: "hashed".to_string(),
        full_name: "Alice Liddell".to_string(),
        email: format!("{username}@example.com"),
    }
}

#[tokio::test]
async fn test_fresh_user_commits_with_exactly_one_task() {
    let backends = TestBackends::new();
    let service = backends.service();

    let response = service
        .create_user(create_user_request("alice"))
        .await
        .unwrap();

    assert_eq!(response.user.username, "alice");
    assert!(!response.user.is_email_verified);
    assert_eq!(backends.store.users().await.len(), 1);

    assert_eq!(backends.broker.total_enqueued().await, 1);
    let pending = backends.broker.pending("critical").await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_type, TASK_SEND_VERIFY_EMAIL);
    assert_eq!(pending[0].payload, json!({"username": "alice"}));
    assert_eq!(pending[0].max_retries, 10);
    assert_eq!(pending[0].retried, 0);
}

#[tokio::test]
async fn test_duplicate_user_enqueues_nothing() {
    let backends = TestBackends::new();
    let service = backends.service();
    service
        .create_user(create_user_request("alice"))
        .await
        .unwrap();

    let err = service
        .create_user(create_user_request("alice"))
        .await
        .unwrap_err();

    assert_eq!(err.code, StatusCode::AlreadyExists);
    assert_eq!(backends.store.users().await.len(), 1);
    assert_eq!(backends.broker.total_enqueued().await, 1);
}

#[tokio::test]
async fn test_duplicate_user_is_mutation_failure_at_store_level() {
    let backends = TestBackends::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let first_calls = calls.clone();
    backends
        .store
        .create_user_tx(CreateUserTxParams::new(user_params("bob"), move |_| async move {
            first_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .await
        .unwrap();

    let second_calls = calls.clone();
    let err = backends
        .store
        .create_user_tx(CreateUserTxParams::new(user_params("bob"), move |_| async move {
            second_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .await
        .unwrap_err();

    assert!(err.is_mutation_failed());
    assert!(err.store_error().unwrap().is_unique_violation());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_broker_outage_leaves_no_user_row() {
    let backends = TestBackends::new();
    let service = backends.service();
    backends.broker.set_available(false);

    let err = service
        .create_user(create_user_request("carol"))
        .await
        .unwrap_err();

    assert_eq!(err.code, StatusCode::Internal);
    assert!(backends.store.users().await.is_empty());
    assert_eq!(backends.broker.total_enqueued().await, 0);

    // The rolled-back insert does not block a retry once the broker is back
    backends.broker.set_available(true);
    service
        .create_user(create_user_request("carol"))
        .await
        .unwrap();
    assert_eq!(backends.store.users().await.len(), 1);
    assert_eq!(backends.broker.total_enqueued().await, 1);
}

#[tokio::test]
async fn test_effect_failure_is_returned_unchanged() {
    let backends = TestBackends::new();

    let err = backends
        .store
        .create_user_tx(CreateUserTxParams::new(user_params("dave"), |_| async {
            Err::<(), BoxError>(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "broker unreachable",
            )))
        }))
        .await
        .unwrap_err();

    match err {
        TxError::EffectFailed(source) => {
            let io = source.downcast_ref::<std::io::Error>().unwrap();
            assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
        }
        other => panic!("expected effect failure, got {other:?}"),
    }
    assert!(backends.store.users().await.is_empty());
}

#[tokio::test]
async fn test_effect_sees_the_inserted_user_before_commit() {
    let backends = TestBackends::new();
    let observed: Arc<parking_lot::Mutex<Option<User>>> = Arc::default();
    let slot = observed.clone();
    let store = backends.store.clone();

    let result = backends
        .store
        .create_user_tx(CreateUserTxParams::new(user_params("erin"), move |user| async move {
            *slot.lock() = Some(user);
            // MemoryStore holds its table lock until commit: readers, this
            // effect included, wait instead of seeing the uncommitted row
            let visible = tokio::time::timeout(Duration::from_millis(20), store.users()).await;
            assert!(visible.is_err());
            Ok(())
        }))
        .await
        .unwrap();

    let observed = observed.lock().clone().unwrap();
    assert_eq!(observed, result.user);
    assert_eq!(backends.store.users().await, vec![result.user]);
}

#[tokio::test]
async fn test_failing_distributor_is_attempted_once_and_rolls_back() {
    let backends = TestBackends::new();
    let distributor = Arc::new(FailingDistributor::default());
    let service = BankService::new(
        &test_config().auth,
        backends.store.clone(),
        distributor.clone(),
    )
    .unwrap();

    let err = service
        .create_user(create_user_request("frank"))
        .await
        .unwrap_err();

    assert_eq!(err.code, StatusCode::Internal);
    assert_eq!(distributor.attempts.load(Ordering::SeqCst), 1);
    assert!(backends.store.users().await.is_empty());
}
