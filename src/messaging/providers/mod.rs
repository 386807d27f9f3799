//! Broker providers.

pub mod in_memory;
pub mod pgmq;

pub use in_memory::InMemoryBroker;
pub use self::pgmq::PgmqBroker;
