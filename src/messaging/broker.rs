//! # Broker Trait
//!
//! Provider-agnostic durable queue operations used by the distributor and the
//! processor. Each of them owns its own `Arc<dyn Broker>`; the two never share
//! a connection.

use async_trait::async_trait;
use std::time::Duration;

use super::errors::MessagingResult;
use super::types::{MessageId, QueueStats, ReceiptHandle, ReceivedTask, TaskEnvelope};

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Create a queue if it doesn't exist (idempotent)
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    async fn ensure_queues(&self, queue_names: &[String]) -> MessagingResult<()> {
        for queue_name in queue_names {
            self.ensure_queue(queue_name).await?;
        }
        Ok(())
    }

    /// Push an envelope; it becomes visible to consumers after `delay`
    async fn enqueue(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId>;

    /// Pop the oldest visible envelope, hiding it for `visibility_timeout`.
    ///
    /// An unacknowledged message becomes visible again once the timeout
    /// lapses, which is what makes delivery at-least-once.
    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<ReceivedTask>>;

    /// Remove a processed message
    async fn ack(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()>;

    /// Move a message to the dead-letter archive
    async fn archive(
        &self,
        queue_name: &str,
        task: &ReceivedTask,
        reason: &str,
    ) -> MessagingResult<()>;

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats>;

    async fn health_check(&self) -> MessagingResult<bool>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Queue names end up in table names for the pgmq provider
pub(crate) fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
    use super::errors::MessagingError;

    if queue_name.is_empty() {
        return Err(MessagingError::invalid_queue_name(queue_name, "empty"));
    }
    if queue_name.len() > 47 {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "longer than 47 characters",
        ));
    }
    if !queue_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "only ASCII letters, digits and '_' are allowed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("critical").is_ok());
        assert!(validate_queue_name("low_priority_2").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("drop table;").is_err());
        assert!(validate_queue_name(&"q".repeat(48)).is_err());
    }
}
