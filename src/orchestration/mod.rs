//! # Service Orchestration
//!
//! Supervises the server's long-running services as one fail-fast group.
//!
//! - [`ServiceHandle`] - what a supervised service implements
//! - [`ServiceOrchestrator`] - sequential start, shared cancellation, first
//!   error wins, bounded shutdown
//! - [`ServiceState`] / [`ServiceStates`] - observable per-service lifecycle
//! - [`services`] - processor, gateway and RPC adapters
//!
//! ```rust,no_run
//! use simplebank::orchestration::{ServiceHandle, ServiceOrchestrator};
//! # async fn example(services: Vec<Box<dyn ServiceHandle>>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut orchestrator = ServiceOrchestrator::new(std::time::Duration::from_secs(10));
//! for service in services {
//!     orchestrator.register_boxed(service)?;
//! }
//! orchestrator.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod orchestrator;
pub mod service;
pub mod services;
pub mod signal;
pub mod state;

pub use errors::{ServiceError, SharedError};
pub use orchestrator::ServiceOrchestrator;
pub use service::ServiceHandle;
pub use services::{
    GatewayService, ProcessorService, RpcService, GATEWAY_SERVICE, PROCESSOR_SERVICE, RPC_SERVICE,
};
pub use signal::wait_for_shutdown_signal;
pub use state::{ServiceState, ServiceStates};
