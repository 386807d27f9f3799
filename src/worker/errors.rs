//! Task pipeline errors.

use thiserror::Error;

use crate::messaging::MessagingError;

/// Failure to hand a task to the broker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DistributorError {
    #[error("Failed to serialize payload for {task_type}: {message}")]
    Serialization { task_type: String, message: String },

    #[error("Failed to enqueue {task_type} on {queue}: {source}")]
    EnqueueFailed {
        task_type: String,
        queue: String,
        #[source]
        source: MessagingError,
    },
}

impl DistributorError {
    pub fn serialization(task_type: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Serialization {
            task_type: task_type.into(),
            message: err.to_string(),
        }
    }

    pub fn enqueue_failed(
        task_type: impl Into<String>,
        queue: impl Into<String>,
        source: MessagingError,
    ) -> Self {
        Self::EnqueueFailed {
            task_type: task_type.into(),
            queue: queue.into(),
            source,
        }
    }
}

/// Outcome of a failed handler invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Worth another attempt after backoff
    #[error("retryable: {message}")]
    Retryable { message: String },

    /// Will never succeed; archive without retrying
    #[error("fatal: {message}")]
    Fatal { message: String },

    #[error("no handler registered for task type {task_type}")]
    UnknownTaskType { task_type: String },
}

impl TaskError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn unknown_task_type(task_type: impl Into<String>) -> Self {
        Self::UnknownTaskType {
            task_type: task_type.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("Handler already registered for task type {task_type}")]
    DuplicateHandler { task_type: String },

    #[error("Task processor already started")]
    AlreadyStarted,

    #[error("Task processor configuration error: {message}")]
    Configuration { message: String },

    #[error("Task processor messaging error: {0}")]
    Messaging(#[from] MessagingError),
}
