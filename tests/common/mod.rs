//! Shared fixtures for integration tests: in-memory backends, a config
//! bound to ephemeral localhost ports and request builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use simplebank::api::{BankService, CreateUserRequest};
use simplebank::bootstrap::ServerDependencies;
use simplebank::config::BankConfig;
use simplebank::database::MemoryStore;
use simplebank::mail::RecordingMailer;
use simplebank::messaging::InMemoryBroker;
use simplebank::worker::BrokerTaskDistributor;

pub const PASSWORD: &str = "secret123";

/// In-memory backends shared between the request side and the processor
pub struct TestBackends {
    pub store: Arc<MemoryStore>,
    pub broker: Arc<InMemoryBroker>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            broker: Arc::new(InMemoryBroker::with_queues(&["critical", "default", "low"])),
            mailer: Arc::new(RecordingMailer::new()),
        }
    }

    pub fn dependencies(&self) -> ServerDependencies {
        ServerDependencies {
            store: self.store.clone(),
            distributor_broker: self.broker.clone(),
            processor_broker: self.broker.clone(),
            mailer: self.mailer.clone(),
        }
    }

    pub fn service(&self) -> Arc<BankService> {
        let config = test_config();
        Arc::new(
            BankService::new(
                &config.auth,
                self.store.clone(),
                Arc::new(BrokerTaskDistributor::new(
                    self.broker.clone(),
                    config.processor.default_max_retries,
                )),
            )
            .expect("test auth config is valid"),
        )
    }
}

/// Ephemeral ports, short grace period, fast polling
pub fn test_config() -> BankConfig {
    let mut config = BankConfig::default();
    config.server.http_address = "127.0.0.1:0".to_string();
    config.server.rpc_address = "127.0.0.1:0".to_string();
    config.server.shutdown_grace_period_ms = 2_000;
    config.processor.concurrency = 2;
    config.processor.backoff_base_ms = 10;
    config.processor.backoff_max_ms = 100;
    config.broker.poll_interval_ms = 10;
    config
}

pub fn grace() -> Duration {
    test_config().server.shutdown_grace_period()
}

pub fn create_user_request(username: &str) -> CreateUserRequest {
    CreateUserRequest {
        username: username.to_string(),
        full_name: "Alice Liddell".to_string(),
        email: format!("{username}@example.com"),
        password: PASSWORD.to_string(),
    }
}
