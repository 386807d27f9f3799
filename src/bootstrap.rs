//! # Server Bootstrap
//!
//! Wires configuration and backends into a ready-to-run
//! [`ServiceOrchestrator`]. The production path connects to Postgres and
//! pgmq; tests hand in in-memory backends through [`ServerDependencies`].
//!
//! Startup order is processor, then gateway, then RPC endpoint, so queued
//! work is being drained before requests can enqueue more.

use std::sync::Arc;
use tracing::info;

use crate::api::BankService;
use crate::config::BankConfig;
use crate::database::{create_pool, run_migrations, PgStore, Store};
use crate::error::Result;
use crate::mail::{LogMailer, Mailer};
use crate::messaging::{Broker, PgmqBroker};
use crate::orchestration::{GatewayService, ProcessorService, RpcService, ServiceOrchestrator};
use crate::worker::{
    BrokerTaskDistributor, HandlerRegistry, ProcessorSettings, SendVerifyEmailHandler,
    TaskDistributor, TaskProcessor, TASK_SEND_VERIFY_EMAIL,
};

/// Backends the server runs on
#[derive(Clone)]
pub struct ServerDependencies {
    pub store: Arc<dyn Store>,
    /// Broker connection used by request handlers to enqueue tasks
    pub distributor_broker: Arc<dyn Broker>,
    /// Broker connection owned by the task processor
    pub processor_broker: Arc<dyn Broker>,
    pub mailer: Arc<dyn Mailer>,
}

impl ServerDependencies {
    /// Connect to Postgres and pgmq as configured
    pub async fn connect(config: &BankConfig) -> Result<Self> {
        let pool = create_pool(&config.database).await?;
        if config.database.run_migrations {
            run_migrations(&pool).await?;
        }

        // Separate broker connections so request-side enqueues never wait
        // on processor polling for a pool slot
        let distributor_broker = PgmqBroker::connect(&config.broker).await?;
        let processor_broker = PgmqBroker::connect(&config.broker).await?;

        Ok(Self {
            store: Arc::new(PgStore::new(pool)),
            distributor_broker: Arc::new(distributor_broker),
            processor_broker: Arc::new(processor_broker),
            mailer: Arc::new(LogMailer::new(&config.email)),
        })
    }
}

/// Everything the orchestrator supervises, exposed for inspection
pub struct ServerHandle {
    pub orchestrator: ServiceOrchestrator,
    pub service: Arc<BankService>,
    pub processor: Arc<TaskProcessor>,
    pub gateway: BoundAddress,
    pub rpc: BoundAddress,
}

/// Address a network service bound to, available after startup
pub type BoundAddress = Arc<std::sync::OnceLock<std::net::SocketAddr>>;

pub struct ServerBootstrap;

impl ServerBootstrap {
    /// Build the orchestrator with processor, gateway and RPC registered in
    /// startup order.
    ///
    /// Creates every configured queue through the distributor's own broker
    /// connection, so request handlers can enqueue before the processor has
    /// started.
    pub async fn assemble(config: &BankConfig, deps: ServerDependencies) -> Result<ServerHandle> {
        config.validate()?;
        let grace = config.server.shutdown_grace_period();

        let distributor = BrokerTaskDistributor::new(
            deps.distributor_broker,
            config.processor.default_max_retries,
        );
        distributor.ensure_queues(&config.processor.queues).await?;
        let distributor: Arc<dyn TaskDistributor> = Arc::new(distributor);
        let service = Arc::new(BankService::new(
            &config.auth,
            deps.store.clone(),
            distributor,
        )?);

        let registry = HandlerRegistry::builder()
            .register(
                TASK_SEND_VERIFY_EMAIL,
                Arc::new(SendVerifyEmailHandler::new(
                    deps.store,
                    deps.mailer,
                    config.email.clone(),
                )),
            )?
            .build();
        let processor = Arc::new(TaskProcessor::new(
            deps.processor_broker,
            Arc::new(registry),
            ProcessorSettings::from_config(&config.processor, &config.broker),
        ));

        let gateway =
            GatewayService::new(config.server.http_address.clone(), service.clone(), grace);
        let rpc = RpcService::new(config.server.rpc_address.clone(), service.clone(), grace);
        let gateway_address = gateway.bound_address();
        let rpc_address = rpc.bound_address();

        let mut orchestrator = ServiceOrchestrator::new(grace);
        orchestrator
            .register(ProcessorService::new(processor.clone()))?
            .register(gateway)?
            .register(rpc)?;

        info!(
            http_address = %config.server.http_address,
            rpc_address = %config.server.rpc_address,
            grace_ms = grace.as_millis() as u64,
            "🔧 BOOTSTRAP: Services assembled"
        );

        Ok(ServerHandle {
            orchestrator,
            service,
            processor,
            gateway: gateway_address,
            rpc: rpc_address,
        })
    }
}
