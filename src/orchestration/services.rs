//! # Supervised Services
//!
//! [`ServiceHandle`] adapters for the three long-running parts of the server:
//! the background task processor, the HTTP gateway and the RPC endpoint.
//! Both network services bind in `start`, so a taken port fails startup
//! instead of surfacing later.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::errors::ServiceError;
use super::service::ServiceHandle;
use crate::api::BankService;
use crate::rpc::RpcServer;
use crate::web::GatewayServer;
use crate::worker::TaskProcessor;

pub const PROCESSOR_SERVICE: &str = "task_processor";
pub const GATEWAY_SERVICE: &str = "http_gateway";
pub const RPC_SERVICE: &str = "rpc_server";

#[derive(Debug, thiserror::Error)]
#[error("{0} was run before it was started")]
struct NotStarted(&'static str);

/// The background task processor
pub struct ProcessorService {
    processor: Arc<TaskProcessor>,
}

impl ProcessorService {
    pub fn new(processor: Arc<TaskProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl ServiceHandle for ProcessorService {
    fn name(&self) -> &str {
        PROCESSOR_SERVICE
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        self.processor
            .start()
            .await
            .map_err(|e| ServiceError::start_failed(PROCESSOR_SERVICE, e))
    }

    async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        // Workers run on their own tasks; this only holds the slot open
        shutdown.cancelled().await;
        Ok(())
    }

    async fn shutdown(&mut self, grace: Duration) -> Result<(), ServiceError> {
        if !self.processor.shutdown(grace).await {
            warn!(
                service = PROCESSOR_SERVICE,
                "Workers still busy at end of grace period"
            );
        }
        Ok(())
    }
}

/// The HTTP/JSON gateway
pub struct GatewayService {
    address: String,
    service: Arc<BankService>,
    grace: Duration,
    server: Option<GatewayServer>,
    bound: Arc<OnceLock<SocketAddr>>,
}

impl GatewayService {
    pub fn new(address: impl Into<String>, service: Arc<BankService>, grace: Duration) -> Self {
        Self {
            address: address.into(),
            service,
            grace,
            server: None,
            bound: Arc::new(OnceLock::new()),
        }
    }

    /// Filled in once the listener is bound
    pub fn bound_address(&self) -> Arc<OnceLock<SocketAddr>> {
        self.bound.clone()
    }
}

#[async_trait]
impl ServiceHandle for GatewayService {
    fn name(&self) -> &str {
        GATEWAY_SERVICE
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        let server = GatewayServer::bind(&self.address, self.service.clone())
            .await
            .map_err(|e| ServiceError::start_failed(GATEWAY_SERVICE, e))?;
        let _ = self.bound.set(server.local_addr());
        self.server = Some(server);
        Ok(())
    }

    async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let server = self
            .server
            .take()
            .ok_or_else(|| ServiceError::failed(GATEWAY_SERVICE, NotStarted(GATEWAY_SERVICE)))?;
        server
            .serve(shutdown, self.grace)
            .await
            .map_err(|e| ServiceError::failed(GATEWAY_SERVICE, e))
    }
}

/// The RPC endpoint
pub struct RpcService {
    address: String,
    service: Arc<BankService>,
    grace: Duration,
    server: Option<RpcServer>,
    bound: Arc<OnceLock<SocketAddr>>,
}

impl RpcService {
    pub fn new(address: impl Into<String>, service: Arc<BankService>, grace: Duration) -> Self {
        Self {
            address: address.into(),
            service,
            grace,
            server: None,
            bound: Arc::new(OnceLock::new()),
        }
    }

    /// Filled in once the listener is bound
    pub fn bound_address(&self) -> Arc<OnceLock<SocketAddr>> {
        self.bound.clone()
    }
}

#[async_trait]
impl ServiceHandle for RpcService {
    fn name(&self) -> &str {
        RPC_SERVICE
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        let server = RpcServer::bind(&self.address, self.service.clone())
            .await
            .map_err(|e| ServiceError::start_failed(RPC_SERVICE, e))?;
        let _ = self.bound.set(server.local_addr());
        self.server = Some(server);
        Ok(())
    }

    async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let server = self
            .server
            .take()
            .ok_or_else(|| ServiceError::failed(RPC_SERVICE, NotStarted(RPC_SERVICE)))?;
        server
            .serve(shutdown, self.grace)
            .await
            .map_err(|e| ServiceError::failed(RPC_SERVICE, e))
    }
}
