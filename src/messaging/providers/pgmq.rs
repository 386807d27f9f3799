//! # PGMQ Broker
//!
//! [`Broker`] over Postgres Message Queue. Queues are pgmq queues, the
//! visibility timeout is pgmq's `vt`, delayed delivery is `send_delay` and the
//! dead-letter archive is pgmq's `a_{queue}` table.

use async_trait::async_trait;
use ::pgmq::{types::Message, PGMQueue};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::messaging::broker::{validate_queue_name, Broker};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::types::{MessageId, QueueStats, ReceiptHandle, ReceivedTask, TaskEnvelope};

#[derive(Debug, Clone)]
pub struct PgmqBroker {
    pgmq: PGMQueue,
    pool: PgPool,
}

impl PgmqBroker {
    /// Open a dedicated pool against the broker database
    pub async fn connect(config: &BrokerConfig) -> MessagingResult<Self> {
        info!("🚀 BROKER: Connecting to pgmq");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| MessagingError::connection(format!("Failed to connect to pgmq: {e}")))?;

        let broker = Self::new_with_pool(pool).await;
        info!("✅ BROKER: Connected to pgmq");
        Ok(broker)
    }

    /// Create a broker over an existing pool (BYOP - Bring Your Own Pool)
    pub async fn new_with_pool(pool: PgPool) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool.clone()).await;
        Self { pgmq, pool }
    }

    fn message_id(queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<i64> {
        receipt_handle.as_i64().ok_or_else(|| {
            MessagingError::queue_operation(
                queue_name,
                "parse_receipt",
                format!("invalid receipt handle {receipt_handle}"),
            )
        })
    }
}

#[async_trait]
impl Broker for PgmqBroker {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        validate_queue_name(queue_name)?;
        debug!("📋 Ensuring queue: {}", queue_name);

        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
        Ok(())
    }

    async fn enqueue(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId> {
        let message_id = self
            .pgmq
            .send_delay(queue_name, envelope, delay_seconds(delay))
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        debug!(
            queue = %queue_name,
            message_id = message_id,
            task_type = %envelope.task_type,
            "📤 Task enqueued"
        );
        Ok(MessageId::from(message_id))
    }

    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<ReceivedTask>> {
        let vt = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let message: Option<Message<serde_json::Value>> = self
            .pgmq
            .read(queue_name, Some(vt))
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        let Some(message) = message else {
            return Ok(None);
        };

        match serde_json::from_value::<TaskEnvelope>(message.message) {
            Ok(envelope) => Ok(Some(ReceivedTask {
                receipt_handle: ReceiptHandle::from(message.msg_id),
                envelope,
                receive_count: u32::try_from(message.read_ct).unwrap_or(u32::MAX),
            })),
            Err(e) => {
                // An undecodable message would be redelivered forever
                warn!(
                    queue = %queue_name,
                    message_id = message.msg_id,
                    error = %e,
                    "📦 Archiving undecodable message"
                );
                self.pgmq
                    .archive(queue_name, message.msg_id)
                    .await
                    .map_err(|e| {
                        MessagingError::queue_operation(queue_name, "archive", e.to_string())
                    })?;
                Err(MessagingError::message_deserialization(e.to_string()))
            }
        }
    }

    async fn ack(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()> {
        let message_id = Self::message_id(queue_name, receipt_handle)?;
        self.pgmq
            .delete(queue_name, message_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;
        Ok(())
    }

    async fn archive(
        &self,
        queue_name: &str,
        task: &ReceivedTask,
        reason: &str,
    ) -> MessagingResult<()> {
        let message_id = Self::message_id(queue_name, &task.receipt_handle)?;
        warn!(
            queue = %queue_name,
            message_id = message_id,
            task_id = %task.envelope.task_id,
            task_type = %task.envelope.task_type,
            reason = %reason,
            "📦 Archiving task"
        );
        self.pgmq
            .archive(queue_name, message_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "archive", e.to_string()))?;
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats> {
        validate_queue_name(queue_name)?;

        let metrics: Option<(i64, Option<i32>)> = sqlx::query_as(
            "SELECT queue_length, oldest_msg_age_sec FROM pgmq.metrics($1)",
        )
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some((queue_length, oldest_age_sec)) = metrics else {
            return Err(MessagingError::queue_not_found(queue_name));
        };

        // validated above, safe to interpolate
        let in_flight: (i64,) = sqlx::query_as(&format!(
            "SELECT count(*) FROM pgmq.q_{queue_name} WHERE vt > now()"
        ))
        .fetch_one(&self.pool)
        .await?;
        let archived: (i64,) =
            sqlx::query_as(&format!("SELECT count(*) FROM pgmq.a_{queue_name}"))
                .fetch_one(&self.pool)
                .await?;

        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            message_count: queue_length.max(0) as u64,
            in_flight_count: in_flight.0.max(0) as u64,
            archived_count: archived.0.max(0) as u64,
            oldest_message_age_ms: oldest_age_sec.map(|s| s.max(0) as u64 * 1000),
        })
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}

/// pgmq delays have whole-second granularity; round up so a retry is never
/// made visible earlier than its backoff
fn delay_seconds(delay: Duration) -> u64 {
    delay.as_secs() + u64::from(delay.subsec_nanos() > 0)
}
