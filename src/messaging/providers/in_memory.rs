//! # In-Memory Broker
//!
//! Thread-safe in-memory queues for tests and local development.
//!
//! ## Features
//!
//! - **Visibility Timeout**: received messages are hidden until acked,
//!   archived or the timeout lapses
//! - **Delayed Delivery**: `enqueue` honours its delay
//! - **Archive**: archived tasks are kept per queue for inspection
//! - **Outage Simulation**: [`InMemoryBroker::set_available`] makes every
//!   operation fail the way an unreachable broker would
//!
//! Visibility uses `tokio::time::Instant`, so tests running on a paused
//! clock can step through delays and backoff deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::messaging::broker::{validate_queue_name, Broker};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::types::{
    ArchivedTask, MessageId, QueueStats, ReceiptHandle, ReceivedTask, TaskEnvelope,
};

#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    envelope: TaskEnvelope,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<InMemoryQueuedMessage>,
    archive: Vec<ArchivedTask>,
    total_sent: u64,
    total_acked: u64,
}

#[derive(Debug)]
pub struct InMemoryBroker {
    queues: RwLock<HashMap<String, InMemoryQueue>>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Create with pre-initialized queues
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let queues = queue_names
            .iter()
            .map(|name| (name.to_string(), InMemoryQueue::default()))
            .collect();
        Self {
            queues: RwLock::new(queues),
            ..Self::new()
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Messages in a queue, visible or not (for testing)
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Envelopes currently in a queue, oldest first (for testing)
    pub async fn pending(&self, queue_name: &str) -> Vec<TaskEnvelope> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.iter().map(|m| m.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// Total envelopes ever enqueued across all queues (for testing)
    pub async fn total_enqueued(&self) -> u64 {
        let queues = self.queues.read().await;
        queues.values().map(|q| q.total_sent).sum()
    }

    /// Dead-lettered tasks of a queue (for testing)
    pub async fn archived(&self, queue_name: &str) -> Vec<ArchivedTask> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.archive.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> MessagingResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::unavailable("in-memory broker is offline"))
        }
    }

    fn parse_handle(receipt_handle: &ReceiptHandle) -> MessagingResult<u64> {
        receipt_handle
            .as_u64()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.check_available()?;
        validate_queue_name(queue_name)?;
        let mut queues = self.queues.write().await;
        queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn enqueue(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId> {
        self.check_available()?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        queue.total_sent += 1;
        queue.messages.push_back(InMemoryQueuedMessage {
            id,
            envelope: envelope.clone(),
            enqueued_at: Utc::now(),
            visible_at: Instant::now() + delay,
            receive_count: 0,
        });

        Ok(MessageId::from(id))
    }

    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<ReceivedTask>> {
        self.check_available()?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let Some(msg) = queue.messages.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        msg.visible_at = now + visibility_timeout;
        msg.receive_count += 1;

        Ok(Some(ReceivedTask {
            receipt_handle: ReceiptHandle::from(msg.id),
            envelope: msg.envelope.clone(),
            receive_count: msg.receive_count,
        }))
    }

    async fn ack(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<()> {
        self.check_available()?;
        let message_id = Self::parse_handle(receipt_handle)?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))?;
        queue.messages.remove(pos);
        queue.total_acked += 1;
        Ok(())
    }

    async fn archive(
        &self,
        queue_name: &str,
        task: &ReceivedTask,
        reason: &str,
    ) -> MessagingResult<()> {
        self.check_available()?;
        let message_id = Self::parse_handle(&task.receipt_handle)?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))?;
        let removed = queue.messages.remove(pos);

        let mut envelope = removed.map(|m| m.envelope).unwrap_or_else(|| task.envelope.clone());
        envelope.last_error = Some(reason.to_string());
        queue.archive.push(ArchivedTask {
            envelope,
            reason: reason.to_string(),
            archived_at: Utc::now(),
        });
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats> {
        self.check_available()?;

        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let in_flight_count = queue
            .messages
            .iter()
            .filter(|m| m.receive_count > 0 && m.visible_at > now)
            .count() as u64;
        let oldest_message_age_ms = queue
            .messages
            .front()
            .map(|m| (Utc::now() - m.enqueued_at).num_milliseconds().max(0) as u64);

        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            message_count: queue.messages.len() as u64,
            in_flight_count,
            archived_count: queue.archive.len() as u64,
            oldest_message_age_ms,
        })
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
