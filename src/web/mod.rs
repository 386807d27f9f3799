//! # HTTP Gateway
//!
//! JSON over HTTP in front of the same [`BankService`] the RPC endpoint
//! serves. Routes:
//!
//! - `POST /v1/create_user`
//! - `POST /v1/login_user`
//! - `PATCH /v1/update_user` (bearer token)
//! - `GET /v1/verify_email`
//! - `GET /health`

pub mod errors;
pub mod handlers;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::BankService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BankService>,
}

pub fn router(service: Arc<BankService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/create_user", post(handlers::create_user))
        .route("/v1/login_user", post(handlers::login_user))
        .route("/v1/update_user", patch(handlers::update_user))
        .route("/v1/verify_email", get(handlers::verify_email))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { service })
}

pub struct GatewayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
}

impl GatewayServer {
    pub async fn bind(address: &str, service: Arc<BankService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "🔌 GATEWAY: Listener bound");
        Ok(Self {
            listener,
            local_addr,
            router: router(service),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled; open requests get up to `grace`
    /// to complete
    pub async fn serve(self, shutdown: CancellationToken, grace: Duration) -> std::io::Result<()> {
        info!(address = %self.local_addr, "🚀 GATEWAY: Serving HTTP");

        let signal = shutdown.clone();
        let server = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .into_future();
        tokio::pin!(server);

        let drain_deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = &mut server => {
                result?;
                info!("✅ GATEWAY: Stopped");
            }
            _ = drain_deadline => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "⏱️ GATEWAY: Grace period elapsed with requests in flight"
                );
            }
        }
        Ok(())
    }
}
