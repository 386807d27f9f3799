//! Per-service lifecycle state.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::logging::log_service_transition;

/// `Starting → Running → ShuttingDown → Stopped`, plus `Running → Stopped`
/// when a service fails and `Starting → Stopped` when it never starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }

    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running)
                | (Self::Starting, Self::Stopped)
                | (Self::Running, Self::ShuttingDown)
                | (Self::Running, Self::Stopped)
                | (Self::ShuttingDown, Self::Stopped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of every supervised service's state
#[derive(Debug, Clone, Default)]
pub struct ServiceStates {
    inner: Arc<RwLock<HashMap<String, ServiceState>>>,
}

impl ServiceStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, service: &str, state: ServiceState) {
        self.inner.write().insert(service.to_string(), state);
    }

    /// Apply a transition; illegal transitions are logged and ignored
    pub(crate) fn transition(&self, service: &str, next: ServiceState) -> bool {
        let mut states = self.inner.write();
        let Some(current) = states.get_mut(service) else {
            warn!(service = %service, "Transition for unknown service");
            return false;
        };
        if !current.can_transition_to(next) {
            warn!(
                service = %service,
                from = %current,
                to = %next,
                "Ignoring illegal service transition"
            );
            return false;
        }
        let previous = std::mem::replace(current, next);
        drop(states);
        log_service_transition(service, previous.as_str(), next.as_str());
        true
    }

    pub fn get(&self, service: &str) -> Option<ServiceState> {
        self.inner.read().get(service).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, ServiceState> {
        self.inner.read().clone()
    }

    pub fn all_stopped(&self) -> bool {
        self.inner.read().values().all(ServiceState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use ServiceState::*;
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(ShuttingDown));
        assert!(Running.can_transition_to(Stopped));
        assert!(ShuttingDown.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!ShuttingDown.can_transition_to(Running));
        assert!(!Starting.can_transition_to(ShuttingDown));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let states = ServiceStates::new();
        states.insert("rpc_server", ServiceState::Starting);

        assert!(!states.transition("rpc_server", ServiceState::ShuttingDown));
        assert_eq!(states.get("rpc_server"), Some(ServiceState::Starting));
        assert!(states.transition("rpc_server", ServiceState::Running));
        assert!(states.transition("rpc_server", ServiceState::Stopped));
        assert!(states.all_stopped());
    }
}
