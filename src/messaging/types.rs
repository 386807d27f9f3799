//! # Messaging Types
//!
//! The envelope every task travels in, plus the provider-agnostic handles and
//! statistics the [`Broker`](super::Broker) trait speaks in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identifier a provider assigned to an enqueued message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Handle for acknowledging or archiving a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ReceiptHandle {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Serialized form of a task as stored in the broker.
///
/// Retry bookkeeping lives here rather than in provider state so every
/// provider retries identically: a retry is a fresh enqueue of
/// [`TaskEnvelope::next_attempt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub max_retries: u32,
    /// Attempts already made and failed
    pub retried: u32,
    pub queue: String,
    /// Upper bound on a single handler invocation
    pub deadline_ms: Option<u64>,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl TaskEnvelope {
    pub fn new(
        task_type: impl Into<String>,
        payload: serde_json::Value,
        queue: impl Into<String>,
        max_retries: u32,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            max_retries,
            retried: 0,
            queue: queue.into(),
            deadline_ms: deadline.map(|d| d.as_millis() as u64),
            enqueued_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// 1-based number of the attempt this envelope represents
    pub fn attempt(&self) -> u32 {
        self.retried + 1
    }

    /// Whether a failure of this attempt may still be retried
    pub fn can_retry(&self) -> bool {
        self.retried < self.max_retries
    }

    /// The envelope for the attempt after a failed one
    pub fn next_attempt(&self, error: impl Into<String>) -> Self {
        Self {
            retried: self.retried + 1,
            enqueued_at: Utc::now(),
            last_error: Some(error.into()),
            ..self.clone()
        }
    }
}

/// A task handed to a consumer, invisible to others until acked, archived or
/// its visibility timeout lapses
#[derive(Debug, Clone)]
pub struct ReceivedTask {
    pub receipt_handle: ReceiptHandle,
    pub envelope: TaskEnvelope,
    /// How many times the broker has handed out this exact message
    pub receive_count: u32,
}

/// A task moved to the dead-letter archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedTask {
    pub envelope: TaskEnvelope,
    pub reason: String,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    /// Messages in the queue, visible or not
    pub message_count: u64,
    pub in_flight_count: u64,
    pub archived_count: u64,
    pub oldest_message_age_ms: Option<u64>,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            ..Default::default()
        }
    }
}
