//! # Task Processor
//!
//! Fixed-size pool of workers consuming tasks from the broker.
//!
//! ## Worker loop
//!
//! Each worker polls the configured queues in strict priority order (a lower
//! queue is only served when every higher one is empty), dispatches the task
//! to its registered handler and settles it:
//!
//! - success → ack
//! - `Retryable` with retries left → re-enqueue the next attempt after
//!   [`BackoffPolicy`] delay, then ack the current message
//! - `Retryable` with no retries left, `Fatal`, unknown task type → archive
//! - handler panic → caught and archived as `Fatal`; the worker keeps running
//!
//! A task with `max_retries = N` that keeps failing is therefore attempted
//! `N + 1` times before it is archived.
//!
//! ## Shutdown
//!
//! [`TaskProcessor::shutdown`] stops workers from popping new tasks and waits
//! up to a grace period for in-flight handlers. Handlers are never cancelled;
//! workers still busy after the grace period are detached.

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::errors::{ProcessorError, TaskError};
use super::registry::HandlerRegistry;
use crate::config::{BrokerConfig, ProcessorConfig};
use crate::error::panic_message;
use crate::logging::log_task_operation;
use crate::messaging::{Broker, MessagingResult, ReceivedTask};

/// Runtime settings of a [`TaskProcessor`]
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub concurrency: usize,
    /// Queue names, highest priority first
    pub queues: Vec<String>,
    pub backoff: BackoffPolicy,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl ProcessorSettings {
    pub fn from_config(processor: &ProcessorConfig, broker: &BrokerConfig) -> Self {
        Self {
            concurrency: processor.concurrency,
            queues: processor.queues.clone(),
            backoff: BackoffPolicy::from_config(processor),
            poll_interval: broker.poll_interval(),
            visibility_timeout: broker.visibility_timeout(),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessorConfig::default(), &BrokerConfig::default())
    }
}

/// Counters for processor observability
#[derive(Debug, Default)]
pub struct ProcessorStats {
    /// Handler invocations (including unknown task types)
    pub processed: AtomicU64,
    pub succeeded: AtomicU64,
    /// Failed attempts that were re-enqueued
    pub retried: AtomicU64,
    pub archived: AtomicU64,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub archived: u64,
}

/// State shared by every worker of one processor
struct WorkerContext {
    broker: Arc<dyn Broker>,
    registry: Arc<HandlerRegistry>,
    settings: ProcessorSettings,
    stats: Arc<ProcessorStats>,
}

pub struct TaskProcessor {
    context: Arc<WorkerContext>,
    stop: CancellationToken,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskProcessor {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<HandlerRegistry>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                broker,
                registry,
                settings,
                stats: Arc::new(ProcessorStats::default()),
            }),
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Ensure the queues exist and spawn the worker pool
    pub async fn start(&self) -> Result<(), ProcessorError> {
        let settings = &self.context.settings;
        if settings.concurrency == 0 || settings.queues.is_empty() {
            return Err(ProcessorError::Configuration {
                message: "at least one worker and one queue are required".to_string(),
            });
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ProcessorError::AlreadyStarted);
        }

        info!(
            concurrency = settings.concurrency,
            queues = ?settings.queues,
            provider = self.context.broker.provider_name(),
            handlers = ?self.context.registry.task_types(),
            "🚀 PROCESSOR: Starting task processor"
        );

        if let Err(e) = self.context.broker.ensure_queues(&settings.queues).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..settings.concurrency {
            let context = self.context.clone();
            let stop = self.stop.clone();
            workers.push(tokio::spawn(worker_loop(worker_id, context, stop)));
        }

        info!(
            workers = workers.len(),
            "✅ PROCESSOR: Task processor started"
        );
        Ok(())
    }

    /// Stop popping new tasks and wait up to `grace` for in-flight handlers.
    ///
    /// Returns `true` if every worker finished within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(grace_ms = grace.as_millis() as u64, "🛑 PROCESSOR: Shutting down");
        self.stop.cancel();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return true;
        }

        match tokio::time::timeout(grace, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task terminated abnormally");
                    }
                }
                info!(stats = ?self.stats(), "✅ PROCESSOR: Shutdown complete");
                true
            }
            Err(_) => {
                // dropping a JoinHandle detaches the worker
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "⏱️ PROCESSOR: Grace period elapsed with handlers in flight, detaching"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.context.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stop.is_cancelled()
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn worker_loop(worker_id: usize, context: Arc<WorkerContext>, stop: CancellationToken) {
    debug!(worker_id, "🎯 PROCESSOR: Worker started");

    while !stop.is_cancelled() {
        match context.poll_once().await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                warn!(worker_id, error = %e, "Broker poll failed");
            }
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(context.settings.poll_interval) => {}
        }
    }

    debug!(worker_id, "PROCESSOR: Worker stopped");
}

impl WorkerContext {
    /// Process at most one task from the highest-priority non-empty queue.
    /// Returns whether a task was found.
    async fn poll_once(&self) -> MessagingResult<bool> {
        for queue in &self.settings.queues {
            if let Some(received) = self
                .broker
                .receive(queue, self.settings.visibility_timeout)
                .await?
            {
                self.process(queue, received).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn process(&self, queue: &str, received: ReceivedTask) -> MessagingResult<()> {
        let envelope = &received.envelope;
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let result = match self.registry.get(&envelope.task_type) {
            Some(handler) => {
                let guarded = AssertUnwindSafe(handler.handle(envelope)).catch_unwind();
                let outcome = match envelope.deadline() {
                    Some(deadline) => tokio::time::timeout(deadline, guarded)
                        .await
                        .unwrap_or_else(|_| {
                            Ok(Err(TaskError::retryable(format!(
                                "deadline of {}ms exceeded",
                                deadline.as_millis()
                            ))))
                        }),
                    None => guarded.await,
                };
                outcome.unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(
                        task_id = %envelope.task_id,
                        task_type = %envelope.task_type,
                        panic_msg = %message,
                        "💥 PROCESSOR: Handler panicked"
                    );
                    // panics are not retried
                    Err(TaskError::fatal(format!("handler panicked: {message}")))
                })
            }
            None => Err(TaskError::unknown_task_type(&envelope.task_type)),
        };

        match result {
            Ok(()) => {
                self.broker.ack(queue, &received.receipt_handle).await?;
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                log_task_operation(
                    "process",
                    &envelope.task_type,
                    queue,
                    "succeeded",
                    None,
                );
            }
            Err(err) if err.is_retryable() && envelope.can_retry() => {
                let delay = self.settings.backoff.delay_for(envelope.retried);
                let next = envelope.next_attempt(err.to_string());
                // enqueue before ack: a crash in between duplicates, never loses
                self.broker.enqueue(queue, &next, delay).await?;
                self.broker.ack(queue, &received.receipt_handle).await?;
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    task_id = %envelope.task_id,
                    task_type = %envelope.task_type,
                    attempt = envelope.attempt(),
                    max_retries = envelope.max_retries,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "🔁 PROCESSOR: Task failed, retrying"
                );
            }
            Err(err) => {
                let reason = err.to_string();
                self.broker.archive(queue, &received, &reason).await?;
                self.stats.archived.fetch_add(1, Ordering::Relaxed);
                error!(
                    task_id = %envelope.task_id,
                    task_type = %envelope.task_type,
                    attempt = envelope.attempt(),
                    error = %reason,
                    "📦 PROCESSOR: Task archived"
                );
                log_task_operation(
                    "process",
                    &envelope.task_type,
                    queue,
                    "archived",
                    Some(&reason),
                );
            }
        }
        Ok(())
    }
}
