//! # Simplebank Server
//!
//! Runs the task processor, HTTP gateway and RPC endpoint until SIGINT or
//! SIGTERM, or until one of them fails.
//!
//! ```bash
//! SIMPLEBANK__DATABASE__URL=postgres://... cargo run --bin simplebank-server
//! SIMPLEBANK_ENV=production cargo run --release --bin simplebank-server
//! ```

use anyhow::Context;
use std::process::ExitCode;
use tracing::{error, info};

use simplebank::bootstrap::{ServerBootstrap, ServerDependencies};
use simplebank::config::ConfigManager;
use simplebank::logging;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_structured_logging();

    info!("🚀 Starting Simplebank server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    match run().await {
        Ok(()) => {
            info!("👋 Simplebank server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "❌ Simplebank server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    info!("   Environment: {}", manager.environment());

    info!("🔧 Connecting backends...");
    let deps = ServerDependencies::connect(config)
        .await
        .context("failed to connect store and broker")?;

    let mut server = ServerBootstrap::assemble(config, deps)
        .await
        .context("failed to assemble services")?;
    info!("   Press Ctrl+C to shutdown gracefully");
    server
        .orchestrator
        .run()
        .await
        .context("service group stopped with an error")?;
    Ok(())
}
