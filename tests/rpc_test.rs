//! # RPC Endpoint Tests
//!
//! Typed client calls against a live RPC server on an ephemeral port.

mod common;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{create_user_request, TestBackends, PASSWORD};
use simplebank::api::{LoginUserRequest, StatusCode, UpdateUserRequest, VerifyEmailRequest};
use simplebank::rpc::{RpcClient, RpcError, RpcServer};

fn status_of(err: &RpcError) -> Option<StatusCode> {
    match err {
        RpcError::Status(status) => Some(status.code),
        _ => None,
    }
}

async fn start_server(backends: &TestBackends) -> (std::net::SocketAddr, CancellationToken) {
    let server = RpcServer::bind("127.0.0.1:0", backends.service())
        .await
        .unwrap();
    let addr = server.local_addr();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone(), Duration::from_secs(1)));
    (addr, shutdown)
}

#[tokio::test]
async fn test_register_login_update_over_one_connection() {
    let backends = TestBackends::new();
    let (addr, shutdown) = start_server(&backends).await;
    let mut client = RpcClient::connect(addr).await.unwrap();

    let created = client
        .create_user(&create_user_request("alice"))
        .await
        .unwrap();
    assert_eq!(created.user.email, "alice@example.com");

    let login = client
        .login_user(&LoginUserRequest {
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();
    assert!(login.access_token_expires_at > chrono::Utc::now());

    let mut client = client.with_bearer_token(&login.access_token);
    let updated = client
        .update_user(&UpdateUserRequest {
            username: "alice".to_string(),
            password: Some("new-secret".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(updated.user.password_changed_at > created.user.password_changed_at);

    let relogin = client
        .login_user(&LoginUserRequest {
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status_of(&relogin), Some(StatusCode::Unauthenticated));

    shutdown.cancel();
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let backends = TestBackends::new();
    let (addr, shutdown) = start_server(&backends).await;
    let mut client = RpcClient::connect(addr).await.unwrap();

    client
        .create_user(&create_user_request("alice"))
        .await
        .unwrap();
    let duplicate = client
        .create_user(&create_user_request("alice"))
        .await
        .unwrap_err();
    assert_eq!(status_of(&duplicate), Some(StatusCode::AlreadyExists));

    let unknown = client
        .login_user(&LoginUserRequest {
            username: "nobody".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status_of(&unknown), Some(StatusCode::NotFound));

    let anonymous = client
        .update_user(&UpdateUserRequest {
            username: "alice".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(status_of(&anonymous), Some(StatusCode::Unauthenticated));

    let invalid = client
        .verify_email(&VerifyEmailRequest {
            email_id: 0,
            secret_code: "short".to_string(),
        })
        .await
        .unwrap_err();
    match invalid {
        RpcError::Status(status) => {
            assert_eq!(status.code, StatusCode::InvalidArgument);
            assert_eq!(status.violations.len(), 2);
        }
        other => panic!("expected status error, got {other:?}"),
    }

    let unimplemented: Result<serde_json::Value, _> = client
        .call("SimpleBank/Transfer", &serde_json::json!({}))
        .await;
    assert_eq!(
        status_of(&unimplemented.unwrap_err()),
        Some(StatusCode::Unimplemented)
    );

    shutdown.cancel();
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections() {
    let backends = TestBackends::new();
    let (addr, shutdown) = start_server(&backends).await;
    let mut client = RpcClient::connect(addr).await.unwrap();
    client
        .create_user(&create_user_request("alice"))
        .await
        .unwrap();

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client
        .login_user(&LoginUserRequest {
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::ConnectionClosed | RpcError::Io(_)
    ));
}
