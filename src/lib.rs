#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Simplebank
//!
//! Banking API backend: user accounts served over an RPC endpoint and an
//! HTTP/JSON gateway, with side effects such as verification emails pushed
//! onto a durable task queue and executed by a background worker pool.
//!
//! ## Architecture
//!
//! - Every multi-step write goes through the Transactional Unit
//!   ([`database::execute_tx`]): the mutation runs, then a post-mutation
//!   effect (typically enqueueing a task), and the transaction commits only if
//!   both succeed.
//! - The task pipeline ([`worker`]) pairs a [`worker::TaskDistributor`] on the
//!   request side with a [`worker::TaskProcessor`] that pops tasks in strict
//!   queue priority, retries retryable failures with exponential backoff and
//!   archives the rest.
//! - The [`orchestration::ServiceOrchestrator`] runs the processor, the gateway
//!   and the RPC endpoint as one fail-fast group with a shared cancellation
//!   token and a bounded shutdown.
//!
//! ## Module Organization
//!
//! - [`api`] - request validation, status codes and the [`api::BankService`]
//!   both network surfaces call into
//! - [`auth`] - password hashing and access tokens
//! - [`bootstrap`] - wiring configuration and backends into the orchestrator
//! - [`config`] - layered configuration
//! - [`database`] - store trait, Postgres and in-memory backends, transactions
//! - [`mail`] - outbound email
//! - [`messaging`] - queue broker abstraction (pgmq and in-memory)
//! - [`models`] - persisted records
//! - [`orchestration`] - service supervision
//! - [`rpc`] - length-prefixed JSON RPC server and client
//! - [`web`] - axum HTTP gateway
//! - [`worker`] - task distribution and processing
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Everything; Postgres tests need DATABASE_URL
//! ```

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod mail;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod rpc;
pub mod web;
pub mod worker;

pub use api::{ApiError, BankService, StatusCode};
pub use bootstrap::{ServerBootstrap, ServerDependencies, ServerHandle};
pub use config::{BankConfig, ConfigManager};
pub use database::{execute_tx, MemoryStore, PgStore, Store, StoreError, TxError};
pub use error::{BankError, BoxError, Result};
pub use messaging::{Broker, InMemoryBroker, MessagingError, PgmqBroker};
pub use orchestration::{ServiceError, ServiceHandle, ServiceOrchestrator, ServiceState};
pub use worker::{BrokerTaskDistributor, TaskDistributor, TaskProcessor};
