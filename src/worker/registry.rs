//! # Handler Registry
//!
//! Task type → handler map, assembled once through [`HandlerRegistryBuilder`]
//! and shared read-only (`Arc<HandlerRegistry>`) by every worker. There is no
//! runtime registration, so lookups take no lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::errors::{ProcessorError, TaskError};
use crate::messaging::TaskEnvelope;

/// Executes one task type.
///
/// Delivery is at-least-once, so implementations must tolerate being invoked
/// again for a task they already completed.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError>;
}

/// Adapts an async closure into a [`TaskHandler`]
pub struct FnTaskHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTaskHandler<F>
where
    F: Fn(TaskEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn handle(&self, task: &TaskEnvelope) -> Result<(), TaskError> {
        (self.f)(task.clone()).await
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, ProcessorError> {
        let task_type = task_type.into();
        if self.handlers.contains_key(&task_type) {
            return Err(ProcessorError::DuplicateHandler { task_type });
        }
        self.handlers.insert(task_type, handler);
        Ok(self)
    }

    pub fn register_fn<F, Fut>(
        self,
        task_type: impl Into<String>,
        f: F,
    ) -> Result<Self, ProcessorError>
    where
        F: Fn(TaskEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.register(task_type, Arc::new(FnTaskHandler { f }))
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = HandlerRegistry::builder()
            .register_fn("task:a", |_| async { Ok(()) })
            .unwrap()
            .register_fn("task:a", |_| async { Ok(()) });

        assert!(matches!(
            result,
            Err(ProcessorError::DuplicateHandler { ref task_type }) if task_type == "task:a"
        ));
    }

    #[tokio::test]
    async fn test_lookup_dispatches_to_handler() {
        let registry = HandlerRegistry::builder()
            .register_fn("task:fails", |_| async { Err(TaskError::fatal("boom")) })
            .unwrap()
            .register_fn("task:ok", |_| async { Ok(()) })
            .unwrap()
            .build();

        assert_eq!(registry.task_types(), vec!["task:fails", "task:ok"]);
        assert!(!registry.contains("task:missing"));

        let envelope = TaskEnvelope::new("task:fails", serde_json::json!({}), "default", 0, None);
        let err = registry
            .get("task:fails")
            .unwrap()
            .handle(&envelope)
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::fatal("boom"));
    }
}
