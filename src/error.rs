//! # Crate Error Taxonomy
//!
//! Top-level error type for the executable and bootstrap paths. Each subsystem
//! owns its own structured error (`StoreError`, `MessagingError`, `TaskError`,
//! `ServiceError`, ...); this type only aggregates them where a caller has to
//! report "something in startup went wrong" as one value.

use std::any::Any;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::messaging::MessagingError;
use crate::orchestration::ServiceError;
use crate::worker::{DistributorError, ProcessorError};

/// Boxed error used for opaque collaborator failures (post-mutation effects,
/// mail transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Authentication setup error: {0}")]
    Auth(#[from] AuthError),

    #[error("Task distributor error: {0}")]
    Distributor(#[from] DistributorError),

    #[error("Task processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),
}

pub type Result<T> = std::result::Result<T, BankError>;

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_prefixes() {
        let err = BankError::Bootstrap("listener".to_string());
        assert_eq!(err.to_string(), "Bootstrap error: listener");

        let err: BankError = StoreError::NotFound.into();
        assert!(err.to_string().starts_with("Database error"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let caught = std::panic::catch_unwind(|| panic!("worker exploded")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "worker exploded");

        let caught = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "code 7");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "Unknown panic");
    }
}
