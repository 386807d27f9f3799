//! Service supervision errors.

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::error::panic_message;

/// Error shared between the failing service and the orchestrator's
/// first-error slot
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Service {service} failed to start: {source}")]
    StartFailed {
        service: String,
        #[source]
        source: SharedError,
    },

    #[error("Service {service} failed: {source}")]
    Failed {
        service: String,
        #[source]
        source: SharedError,
    },

    #[error("Service {service} exited before shutdown was requested")]
    ExitedEarly { service: String },

    #[error("Service {service} panicked: {message}")]
    Panicked { service: String, message: String },

    #[error("Service {service} is already registered")]
    DuplicateService { service: String },

    #[error("No services registered")]
    NoServices,

    #[error("Orchestrator has already run")]
    AlreadyRan,
}

impl ServiceError {
    pub fn start_failed<E>(service: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StartFailed {
            service: service.into(),
            source: Arc::new(source),
        }
    }

    pub fn failed<E>(service: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            service: service.into(),
            source: Arc::new(source),
        }
    }

    /// A service task unwound; `payload` is what `catch_unwind` returned
    pub fn panicked(service: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            service: service.into(),
            message: panic_message(payload),
        }
    }

    /// Name of the service the error came from, if any
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::StartFailed { service, .. }
            | Self::Failed { service, .. }
            | Self::ExitedEarly { service }
            | Self::Panicked { service, .. }
            | Self::DuplicateService { service } => Some(service),
            Self::NoServices | Self::AlreadyRan => None,
        }
    }

    /// The underlying error, downcast to a concrete type
    pub fn source_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::StartFailed { source, .. } | Self::Failed { source, .. } => {
                source.downcast_ref::<E>()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = ServiceError::start_failed("rpc_server", io);

        assert_eq!(err.service(), Some("rpc_server"));
        assert_eq!(
            err.source_as::<std::io::Error>().unwrap().kind(),
            std::io::ErrorKind::AddrInUse
        );
        assert!(err.to_string().contains("address in use"));
    }
}
