//! # Structured Logging Module
//!
//! Environment-aware structured logging. Development gets a human-readable
//! console layer; every other environment gets JSON lines suitable for log
//! shipping.

use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let console_layer: Box<dyn Layer<Registry> + Send + Sync> = if environment == "development" {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(console_layer.with_filter(filter));

        // A global subscriber may already be installed (tests, embedding binaries)
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 LOGGING: Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("SIMPLEBANK_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" => "debug".to_string(),
        _ => "debug,sqlx=warn,hyper=info".to_string(),
    }
}

/// Log structured data for background task operations
pub fn log_task_operation(
    operation: &str,
    task_type: &str,
    queue: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_type = %task_type,
        queue = %queue,
        status = %status,
        details = details,
        "📋 TASK_OPERATION"
    );
}

/// Log a supervised service changing lifecycle state
pub fn log_service_transition(service: &str, from: &str, to: &str) {
    tracing::info!(
        service = %service,
        from = %from,
        to = %to,
        "🔁 SERVICE_TRANSITION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert!(get_log_level("development").starts_with("debug"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_task_operation("enqueue", "task:test", "default", "ok", None);
    }
}
