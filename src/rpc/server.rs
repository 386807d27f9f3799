//! # RPC Server
//!
//! Accepts TCP connections and serves length-prefixed JSON calls against a
//! [`BankService`]. A connection carries any number of sequential calls.
//!
//! Binding happens in [`RpcServer::bind`], separately from [`RpcServer::serve`],
//! so a port conflict surfaces as a startup error rather than a runtime one.
//!
//! On shutdown the listener closes first, then idle connections close; calls
//! already being dispatched finish and get their response, bounded by the
//! grace period.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::protocol::{
    read_message, write_message, RpcError, RpcRequest, RpcResponse, RpcResult,
    METHOD_CREATE_USER, METHOD_LOGIN_USER, METHOD_UPDATE_USER, METHOD_VERIFY_EMAIL,
};
use crate::api::{ApiError, ApiResult, BankService, FieldViolation, StatusCode};

pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<BankService>,
}

impl RpcServer {
    pub async fn bind(address: &str, service: Arc<BankService>) -> RpcResult<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| RpcError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "🔌 RPC: Listener bound");
        Ok(Self {
            listener,
            local_addr,
            service,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled, then drain connections for up to
    /// `grace`
    pub async fn serve(self, shutdown: CancellationToken, grace: Duration) -> RpcResult<()> {
        let Self {
            listener,
            local_addr,
            service,
        } = self;
        let connections = TaskTracker::new();

        info!(address = %local_addr, "🚀 RPC: Serving");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "RPC: Connection accepted");
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            service.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "RPC: Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);
        connections.close();
        info!(
            open_connections = connections.len(),
            "🛑 RPC: Listener closed, draining connections"
        );
        if tokio::time::timeout(grace, connections.wait()).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "⏱️ RPC: Grace period elapsed with calls in flight"
            );
        }
        info!("✅ RPC: Stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<BankService>,
    shutdown: CancellationToken,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request: RpcRequest = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = read_message(&mut reader) => match message {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "RPC: Dropping connection on bad frame");
                    break;
                }
            },
        };

        let response = dispatch(&service, request).await;
        if let Err(e) = write_message(&mut writer, &response).await {
            error!(peer = %peer, error = %e, "RPC: Failed to write response");
            break;
        }
    }

    debug!(peer = %peer, "RPC: Connection closed");
}

/// Route one request to its handler and log it
pub async fn dispatch(service: &BankService, request: RpcRequest) -> RpcResponse {
    let started = Instant::now();
    let RpcRequest {
        id,
        method,
        authorization,
        params,
    } = request;

    let result = match method.as_str() {
        METHOD_CREATE_USER => invoke(params, |req| service.create_user(req)).await,
        METHOD_LOGIN_USER => invoke(params, |req| service.login_user(req)).await,
        METHOD_UPDATE_USER => {
            invoke(params, |req| {
                service.update_user(authorization.as_deref(), req)
            })
            .await
        }
        METHOD_VERIFY_EMAIL => invoke(params, |req| service.verify_email(req)).await,
        other => Err(ApiError::unimplemented(other)),
    };

    let status = match &result {
        Ok(_) => StatusCode::Ok,
        Err(e) => e.code,
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    if status == StatusCode::Internal {
        error!(method = %method, status_code = %status, duration_ms, "received an RPC request");
    } else {
        info!(method = %method, status_code = %status, duration_ms, "received an RPC request");
    }

    RpcResponse { id, result }
}

async fn invoke<Req, Resp, F, Fut>(params: serde_json::Value, handler: F) -> ApiResult<serde_json::Value>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = ApiResult<Resp>>,
{
    let request: Req = serde_json::from_value(params).map_err(|e| {
        ApiError::invalid_argument(vec![FieldViolation::new("params", e.to_string())])
    })?;
    let response = handler(request).await?;
    serde_json::to_value(response)
        .map_err(|e| ApiError::internal(format!("failed to encode response: {e}")))
}
