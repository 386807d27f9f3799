//! # Background Task Pipeline
//!
//! Producer and consumer sides of deferred work:
//!
//! - [`TaskDistributor`] serializes a [`Task`] into a [`TaskEnvelope`] and
//!   pushes it onto a priority queue of the broker
//! - [`TaskProcessor`] runs a worker pool that pops envelopes in strict queue
//!   priority, dispatches them through the [`HandlerRegistry`] and settles
//!   each one (ack, retry with backoff, or archive)
//!
//! Delivery is at-least-once. Handlers must be idempotent.
//!
//! [`TaskEnvelope`]: crate::messaging::TaskEnvelope

pub mod backoff;
pub mod distributor;
pub mod errors;
pub mod handlers;
pub mod processor;
pub mod registry;
pub mod task;

pub use backoff::BackoffPolicy;
pub use distributor::{BrokerTaskDistributor, TaskDistributor};
pub use errors::{DistributorError, ProcessorError, TaskError};
pub use handlers::{PayloadSendVerifyEmail, SendVerifyEmailHandler, TASK_SEND_VERIFY_EMAIL};
pub use processor::{ProcessorSettings, ProcessorStats, ProcessorStatsSnapshot, TaskProcessor};
pub use registry::{FnTaskHandler, HandlerRegistry, HandlerRegistryBuilder, TaskHandler};
pub use task::{Task, TaskOptions, TaskQueue};
