//! # Service Orchestrator
//!
//! Runs a fixed group of services as one fail-fast unit:
//!
//! 1. Services start sequentially in registration order. If one fails to
//!    start, the services already running are stopped and that error is
//!    returned.
//! 2. Each running service gets its own task. The group shares one
//!    [`CancellationToken`]; the first service to fail records its error and
//!    cancels it.
//! 3. An external shutdown signal cancels the same token.
//! 4. After cancellation every service gets the grace period to stop. Tasks
//!    still running after that are aborted.
//!
//! A panic in `start` or `run` is caught and treated as that service failing
//! with [`ServiceError::Panicked`]. Startup races against cancellation and the
//! signal, so a hung `start` does not block shutdown.
//!
//! Only the first error is reported; later ones are logged.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::errors::ServiceError;
use super::service::ServiceHandle;
use super::signal::wait_for_shutdown_signal;
use super::state::{ServiceState, ServiceStates};

/// Extra time past the grace period before stuck tasks are aborted
const FORCE_STOP_MARGIN: Duration = Duration::from_millis(500);

type FirstError = Arc<OnceLock<ServiceError>>;

pub struct ServiceOrchestrator {
    services: Vec<Box<dyn ServiceHandle>>,
    names: HashSet<String>,
    states: ServiceStates,
    shutdown: CancellationToken,
    first_error: FirstError,
    grace: Duration,
    ran: bool,
}

impl ServiceOrchestrator {
    pub fn new(grace: Duration) -> Self {
        Self {
            services: Vec::new(),
            names: HashSet::new(),
            states: ServiceStates::new(),
            shutdown: CancellationToken::new(),
            first_error: Arc::new(OnceLock::new()),
            grace,
            ran: false,
        }
    }

    /// Add a service; services start in the order they are registered
    pub fn register<S: ServiceHandle>(&mut self, service: S) -> Result<&mut Self, ServiceError> {
        self.register_boxed(Box::new(service))
    }

    pub fn register_boxed(
        &mut self,
        service: Box<dyn ServiceHandle>,
    ) -> Result<&mut Self, ServiceError> {
        let name = service.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(ServiceError::DuplicateService { service: name });
        }
        self.states.insert(&name, ServiceState::Starting);
        self.services.push(service);
        Ok(self)
    }

    /// Token shared by every service; cancelling it stops the group
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn states(&self) -> ServiceStates {
        self.states.clone()
    }

    pub fn state(&self, service: &str) -> Option<ServiceState> {
        self.states.get(service)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Run until SIGINT/SIGTERM or the first service failure
    pub async fn run(&mut self) -> Result<(), ServiceError> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `signal` completes or the first service failure
    pub async fn run_until<F>(&mut self, signal: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send,
    {
        if self.ran {
            return Err(ServiceError::AlreadyRan);
        }
        if self.services.is_empty() {
            return Err(ServiceError::NoServices);
        }
        self.ran = true;

        info!(
            services = self.services.len(),
            grace_ms = self.grace.as_millis() as u64,
            "🚀 ORCHESTRATOR: Starting services"
        );

        let mut running = JoinSet::new();
        let services = std::mem::take(&mut self.services);
        tokio::pin!(signal);
        let mut signalled = false;

        for mut service in services {
            let name = service.name().to_string();
            if self.shutdown.is_cancelled() {
                self.states.transition(&name, ServiceState::Stopped);
                continue;
            }

            // a slow or hung start must not hold off shutdown
            let started = tokio::select! {
                result = AssertUnwindSafe(service.start()).catch_unwind() => {
                    Some(result.unwrap_or_else(|panic| {
                        Err(ServiceError::panicked(name.clone(), panic.as_ref()))
                    }))
                }
                _ = self.shutdown.cancelled() => None,
                _ = &mut signal, if !signalled => {
                    signalled = true;
                    info!("🛑 ORCHESTRATOR: Shutdown signal received during startup");
                    self.shutdown.cancel();
                    None
                }
            };

            match started {
                Some(Ok(())) => {
                    self.states.transition(&name, ServiceState::Running);
                    running.spawn(supervise(
                        service,
                        self.shutdown.clone(),
                        self.states.clone(),
                        self.first_error.clone(),
                        self.grace,
                    ));
                }
                Some(Err(e)) => {
                    error!(service = %name, error = %e, "❌ ORCHESTRATOR: Service failed to start");
                    record_error(&self.first_error, e);
                    self.states.transition(&name, ServiceState::Stopped);
                    self.shutdown.cancel();
                }
                None => {
                    warn!(service = %name, "🛑 ORCHESTRATOR: Startup interrupted by shutdown");
                    self.states.transition(&name, ServiceState::Stopped);
                }
            }
        }

        if !self.shutdown.is_cancelled() {
            info!("✅ ORCHESTRATOR: All services running");
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    warn!("🛑 ORCHESTRATOR: Cancellation observed, stopping all services");
                }
                _ = &mut signal, if !signalled => {
                    info!("🛑 ORCHESTRATOR: Shutdown signal received, stopping all services");
                    self.shutdown.cancel();
                }
            }
        }

        drain(running, self.grace, &self.states).await;

        match self.first_error.get() {
            Some(e) => {
                error!(error = %e, "❌ ORCHESTRATOR: Stopped with error");
                Err(e.clone())
            }
            None => {
                info!("✅ ORCHESTRATOR: All services stopped");
                Ok(())
            }
        }
    }
}

/// Wait for every service task, aborting stragglers past the deadline
async fn drain(mut running: JoinSet<()>, grace: Duration, states: &ServiceStates) {
    let deadline = grace + FORCE_STOP_MARGIN;
    let joined = tokio::time::timeout(deadline, async {
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "❌ ORCHESTRATOR: Service task panicked");
                }
            }
        }
    })
    .await;

    if joined.is_err() {
        warn!(
            grace_ms = grace.as_millis() as u64,
            remaining = running.len(),
            "⏱️ ORCHESTRATOR: Grace period elapsed, aborting remaining services"
        );
        running.abort_all();
        while running.join_next().await.is_some() {}
    }

    // Aborted or panicked tasks never reached their own Stopped transition
    for (name, state) in states.snapshot() {
        if !state.is_terminal() {
            states.transition(&name, ServiceState::Stopped);
        }
    }
}

fn record_error(slot: &FirstError, error: ServiceError) {
    if let Err(later) = slot.set(error) {
        warn!(error = %later, "ORCHESTRATOR: Additional service error after the first");
    }
}

/// Run one service to completion: `run`, then `shutdown` within `grace`
fn supervise(
    mut service: Box<dyn ServiceHandle>,
    token: CancellationToken,
    states: ServiceStates,
    first_error: FirstError,
    grace: Duration,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let name = service.name().to_string();
        let outcome = AssertUnwindSafe(service.run(token.clone()))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) if token.is_cancelled() => None,
            Ok(Ok(())) => Some(ServiceError::ExitedEarly {
                service: name.clone(),
            }),
            Ok(Err(e)) => Some(e),
            Err(panic) => {
                let e = ServiceError::panicked(name.clone(), panic.as_ref());
                error!(service = %name, error = %e, "💥 ORCHESTRATOR: Service panicked");
                record_error(&first_error, e);
                token.cancel();
                // no shutdown call: the service's state is unknown after unwinding
                states.transition(&name, ServiceState::Stopped);
                return;
            }
        };

        match failure {
            Some(e) => {
                error!(service = %name, error = %e, "❌ ORCHESTRATOR: Service failed");
                record_error(&first_error, e);
                token.cancel();
                if let Err(e) = service.shutdown(grace).await {
                    warn!(service = %name, error = %e, "Cleanup after failure reported an error");
                }
                states.transition(&name, ServiceState::Stopped);
            }
            None => {
                states.transition(&name, ServiceState::ShuttingDown);
                if let Err(e) = service.shutdown(grace).await {
                    error!(service = %name, error = %e, "❌ ORCHESTRATOR: Service shutdown failed");
                    record_error(&first_error, e);
                }
                states.transition(&name, ServiceState::Stopped);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records the order of lifecycle calls across services
    type Journal = Arc<Mutex<Vec<String>>>;

    enum StartBehavior {
        Succeed,
        Fail,
        Hang,
        Panic,
    }

    enum RunBehavior {
        UntilCancelled,
        FailAfter(Duration),
        PanicAfter(Duration),
        Hang,
    }

    struct ScriptedService {
        name: String,
        start: StartBehavior,
        behavior: RunBehavior,
        journal: Journal,
    }

    impl ScriptedService {
        fn new(name: &str, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                start: StartBehavior::Succeed,
                behavior: RunBehavior::UntilCancelled,
                journal: journal.clone(),
            }
        }

        fn failing_start(self) -> Self {
            self.start_behavior(StartBehavior::Fail)
        }

        fn start_behavior(mut self, start: StartBehavior) -> Self {
            self.start = start;
            self
        }

        fn behavior(mut self, behavior: RunBehavior) -> Self {
            self.behavior = behavior;
            self
        }
    }

    #[async_trait]
    impl ServiceHandle for ScriptedService {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self) -> Result<(), ServiceError> {
            self.journal.lock().push(format!("start:{}", self.name));
            match self.start {
                StartBehavior::Succeed => Ok(()),
                StartBehavior::Fail => Err(ServiceError::start_failed(
                    self.name.clone(),
                    std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
                )),
                StartBehavior::Hang => std::future::pending().await,
                StartBehavior::Panic => panic!("{} could not initialise", self.name),
            }
        }

        async fn run(&mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
            match self.behavior {
                RunBehavior::UntilCancelled => {
                    shutdown.cancelled().await;
                    Ok(())
                }
                RunBehavior::FailAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(ServiceError::failed(
                        self.name.clone(),
                        std::io::Error::new(std::io::ErrorKind::Other, "boom"),
                    ))
                }
                RunBehavior::PanicAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    panic!("{} lost its listener", self.name);
                }
                RunBehavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }

        async fn shutdown(&mut self, _grace: Duration) -> Result<(), ServiceError> {
            self.journal.lock().push(format!("shutdown:{}", self.name));
            Ok(())
        }
    }

    fn orchestrator() -> ServiceOrchestrator {
        ServiceOrchestrator::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_signal_stops_all_services_cleanly() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("a", &journal)).unwrap();
        orch.register(ScriptedService::new("b", &journal)).unwrap();

        let result = orch
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert!(result.is_ok());
        assert!(orch.states().all_stopped());
        let journal = journal.lock();
        assert_eq!(&journal[..2], &["start:a".to_string(), "start:b".to_string()]);
        assert!(journal.contains(&"shutdown:a".to_string()));
        assert!(journal.contains(&"shutdown:b".to_string()));
    }

    #[tokio::test]
    async fn test_start_failure_stops_started_and_skips_rest() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("first", &journal)).unwrap();
        orch.register(ScriptedService::new("broken", &journal).failing_start())
            .unwrap();
        orch.register(ScriptedService::new("never", &journal)).unwrap();

        let err = orch.run_until(std::future::pending()).await.unwrap_err();

        assert_eq!(err.service(), Some("broken"));
        assert!(matches!(err, ServiceError::StartFailed { .. }));
        assert!(orch.states().all_stopped());
        let journal = journal.lock();
        assert!(!journal.contains(&"start:never".to_string()));
        assert!(journal.contains(&"shutdown:first".to_string()));
    }

    #[tokio::test]
    async fn test_first_runtime_failure_wins_and_cancels_peers() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("steady", &journal)).unwrap();
        orch.register(
            ScriptedService::new("flaky", &journal)
                .behavior(RunBehavior::FailAfter(Duration::from_millis(10))),
        )
        .unwrap();
        orch.register(
            ScriptedService::new("slower", &journal)
                .behavior(RunBehavior::FailAfter(Duration::from_millis(50))),
        )
        .unwrap();

        let err = orch.run_until(std::future::pending()).await.unwrap_err();

        assert_eq!(err.service(), Some("flaky"));
        assert!(orch.shutdown_token().is_cancelled());
        assert!(orch.states().all_stopped());
        assert!(journal.lock().contains(&"shutdown:steady".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_service_fails_the_group() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("steady", &journal)).unwrap();
        orch.register(
            ScriptedService::new("crashes", &journal)
                .behavior(RunBehavior::PanicAfter(Duration::from_millis(10))),
        )
        .unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(3),
            orch.run_until(std::future::pending()),
        )
        .await
        .expect("run must return after a service panics")
        .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Panicked { ref service, ref message }
                if service == "crashes" && message.contains("lost its listener")
        ));
        assert!(orch.shutdown_token().is_cancelled());
        assert!(orch.states().all_stopped());
        assert!(journal.lock().contains(&"shutdown:steady".to_string()));
    }

    #[tokio::test]
    async fn test_panic_during_start_is_a_start_failure() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("first", &journal)).unwrap();
        orch.register(
            ScriptedService::new("broken", &journal).start_behavior(StartBehavior::Panic),
        )
        .unwrap();

        let err = orch.run_until(std::future::pending()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Panicked { ref service, .. } if service == "broken"));
        assert!(orch.states().all_stopped());
        assert!(journal.lock().contains(&"shutdown:first".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_interrupts_hung_start() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("first", &journal)).unwrap();
        orch.register(ScriptedService::new("hung", &journal).start_behavior(StartBehavior::Hang))
            .unwrap();
        orch.register(ScriptedService::new("never", &journal)).unwrap();

        let result = orch
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert!(result.is_ok());
        assert!(orch.states().all_stopped());
        let journal = journal.lock();
        assert!(journal.contains(&"shutdown:first".to_string()));
        assert!(!journal.contains(&"start:never".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_hung_start() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("hung", &journal).start_behavior(StartBehavior::Hang))
            .unwrap();

        let token = orch.shutdown_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        assert!(orch.run_until(std::future::pending()).await.is_ok());
        assert_eq!(orch.state("hung"), Some(ServiceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_service_is_aborted_after_grace() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        orch.register(ScriptedService::new("stuck", &journal).behavior(RunBehavior::Hang))
            .unwrap();

        let result = orch.run_until(async {}).await;

        assert!(result.is_ok());
        assert_eq!(orch.state("stuck"), Some(ServiceState::Stopped));
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let journal = Journal::default();
        let mut orch = orchestrator();
        assert!(matches!(
            orch.run_until(async {}).await,
            Err(ServiceError::NoServices)
        ));

        orch.register(ScriptedService::new("a", &journal)).unwrap();
        assert!(matches!(
            orch.register(ScriptedService::new("a", &journal)),
            Err(ServiceError::DuplicateService { .. })
        ));

        orch.run_until(async {}).await.unwrap();
        assert!(matches!(
            orch.run_until(async {}).await,
            Err(ServiceError::AlreadyRan)
        ));
    }
}
