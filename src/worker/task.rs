//! Tasks and their dispatch options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Priority classes, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskQueue {
    Critical,
    Default,
    Low,
}

impl TaskQueue {
    pub const ALL: [TaskQueue; 3] = [TaskQueue::Critical, TaskQueue::Default, TaskQueue::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Default => "default",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskQueue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "default" => Ok(Self::Default),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown task queue: {other}")),
        }
    }
}

/// Per-task dispatch options.
///
/// `max_retries` of `None` falls back to the distributor's configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub max_retries: Option<u32>,
    pub queue: String,
    /// Bound on a single handler invocation
    pub deadline: Option<Duration>,
    /// Delay before the task first becomes visible to workers
    pub process_in: Duration,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_retries: None,
            queue: TaskQueue::Default.as_str().to_string(),
            deadline: None,
            process_in: Duration::ZERO,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn queue(mut self, queue: TaskQueue) -> Self {
        self.queue = queue.as_str().to_string();
        self
    }

    /// Route to a queue outside the built-in priority classes
    pub fn queue_name(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn process_in(mut self, delay: Duration) -> Self {
        self.process_in = delay;
        self
    }
}

/// An immutable unit of deferred work
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    task_type: String,
    payload: serde_json::Value,
    options: TaskOptions,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value, options: TaskOptions) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            options,
        }
    }

    /// Build a task from any serializable payload
    pub fn from_payload<P: Serialize>(
        task_type: impl Into<String>,
        payload: &P,
        options: TaskOptions,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(task_type, serde_json::to_value(payload)?, options))
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }
}
