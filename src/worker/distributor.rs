//! # Task Distributor
//!
//! Produces tasks into the broker. The distributor owns its own broker
//! connection, independent of the processor's.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::errors::DistributorError;
use super::handlers::send_verify_email::{PayloadSendVerifyEmail, TASK_SEND_VERIFY_EMAIL};
use super::task::{Task, TaskOptions};
use crate::logging::log_task_operation;
use crate::messaging::{Broker, MessageId, TaskEnvelope};

#[async_trait]
pub trait TaskDistributor: Send + Sync + 'static {
    /// Serialize and push a task onto its queue.
    ///
    /// Fails with [`DistributorError::EnqueueFailed`] when the broker is
    /// unreachable or rejects the task.
    async fn distribute_task(&self, task: Task) -> Result<MessageId, DistributorError>;

    async fn distribute_task_send_verify_email(
        &self,
        payload: &PayloadSendVerifyEmail,
        options: TaskOptions,
    ) -> Result<MessageId, DistributorError> {
        let task = Task::from_payload(TASK_SEND_VERIFY_EMAIL, payload, options)
            .map_err(|e| DistributorError::serialization(TASK_SEND_VERIFY_EMAIL, &e))?;
        self.distribute_task(task).await
    }
}

pub struct BrokerTaskDistributor {
    broker: Arc<dyn Broker>,
    default_max_retries: u32,
}

impl BrokerTaskDistributor {
    pub fn new(broker: Arc<dyn Broker>, default_max_retries: u32) -> Self {
        Self {
            broker,
            default_max_retries,
        }
    }

    /// Create every queue tasks may be routed to
    pub async fn ensure_queues(&self, queues: &[String]) -> Result<(), DistributorError> {
        self.broker
            .ensure_queues(queues)
            .await
            .map_err(|e| DistributorError::enqueue_failed("*", queues.join(","), e))
    }
}

#[async_trait]
impl TaskDistributor for BrokerTaskDistributor {
    async fn distribute_task(&self, task: Task) -> Result<MessageId, DistributorError> {
        let options = task.options();
        let envelope = TaskEnvelope::new(
            task.task_type(),
            task.payload().clone(),
            options.queue.clone(),
            options.max_retries.unwrap_or(self.default_max_retries),
            options.deadline,
        );

        let message_id = self
            .broker
            .enqueue(&options.queue, &envelope, options.process_in)
            .await
            .map_err(|e| DistributorError::enqueue_failed(task.task_type(), &options.queue, e))?;

        debug!(
            task_id = %envelope.task_id,
            message_id = %message_id,
            max_retries = envelope.max_retries,
            process_in_ms = options.process_in.as_millis() as u64,
            provider = self.broker.provider_name(),
            "📤 DISTRIBUTOR: Task enqueued"
        );
        log_task_operation(
            "enqueue",
            task.task_type(),
            &options.queue,
            "enqueued",
            None,
        );

        Ok(message_id)
    }
}
