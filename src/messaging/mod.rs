//! # Messaging
//!
//! The durable queue the task pipeline runs on.
//!
//! - [`Broker`] - provider-agnostic queue operations
//! - [`PgmqBroker`] - Postgres Message Queue provider
//! - [`InMemoryBroker`] - in-process provider for tests
//! - [`TaskEnvelope`] - the serialized task, including its retry bookkeeping

pub mod broker;
pub mod errors;
pub mod providers;
pub mod types;

pub use broker::Broker;
pub use errors::{MessagingError, MessagingResult};
pub use providers::{InMemoryBroker, PgmqBroker};
pub use types::{
    ArchivedTask, MessageId, QueueStats, ReceiptHandle, ReceivedTask, TaskEnvelope,
};
