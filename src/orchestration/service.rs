//! The contract every supervised service implements.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::errors::ServiceError;

/// A long-running service under orchestrator supervision.
///
/// The orchestrator calls [`start`](ServiceHandle::start) once, in
/// registration order, then runs [`run`](ServiceHandle::run) on its own task.
/// `run` must return promptly once `shutdown` is cancelled; returning `Ok`
/// before that counts as a failure. [`shutdown`](ServiceHandle::shutdown) is
/// called once after `run` returns and must finish within `grace`.
#[async_trait]
pub trait ServiceHandle: Send + 'static {
    fn name(&self) -> &str;

    /// Acquire resources such as listeners. Errors here abort startup.
    async fn start(&mut self) -> Result<(), ServiceError>;

    async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ServiceError>;

    async fn shutdown(&mut self, _grace: Duration) -> Result<(), ServiceError> {
        Ok(())
    }
}
